use std::time::Duration;

/// Engine and output tuning shared by the worker, the engine and the cpal backend.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Interval of the display tick driving progress updates.
    pub tick_interval: Duration,
    /// Default offset used by [`skip`](crate::engine::PlaybackEngine::skip).
    pub skip_seconds: f64,
    /// Restart from the top when the track finishes instead of stopping.
    pub loop_playback: bool,
    /// Sweep audio toward the scrub target while scrubbing instead of playing on.
    pub scrub_audition: bool,
    /// Capacity of the render → engine event channel.
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    /// ~60 Hz display refresh, 10 second skips, stop at end of track.
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            skip_seconds: 10.0,
            loop_playback: false,
            scrub_audition: false,
            event_capacity: 16,
        }
    }
}
