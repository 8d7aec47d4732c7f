use serde::{Deserialize, Serialize};

/// Transport state of the single playback cursor.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// Nothing playing; position rests at the last seek target (0 after end of track).
    #[default]
    Stopped,
    /// Render clock is advancing.
    Playing,
    /// Segment is scheduled but the render clock is held.
    Paused,
}

/// Reason why the last segment stopped producing audio.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of the track.
    Eof,
    /// The transport refused to schedule or failed mid-playback.
    Error,
    /// Playback was explicitly stopped or superseded by a seek.
    Stopped,
}

/// Published player state consumed by presentation layers.
///
/// Written only by the engine context; everyone else reads snapshots or subscribes.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerStatus {
    /// `true` while the transport is [`TransportState::Playing`].
    pub is_playing: bool,
    /// `true` once a track is loaded and the output session is active.
    pub is_player_ready: bool,
    /// Current transport state.
    pub transport: TransportState,
    /// Displayed progress in `[0, 100]`. Mirrors the scrub value while scrubbing.
    pub progress_percent: f64,
    /// Elapsed playback time in seconds.
    pub elapsed_seconds: f64,
    /// Remaining playback time in seconds.
    pub remaining_seconds: f64,
    /// Elapsed time formatted for display (`MM:SS`).
    pub elapsed_text: String,
    /// Remaining time formatted for display (`MM:SS`).
    pub remaining_text: String,
    /// Normalized meter level in `[0, 1]`; zero unless playing.
    pub meter_level: f32,
    /// `true` while a scrub gesture is active.
    pub is_scrubbing: bool,
    /// Terminal reason of the last segment, if any.
    pub end_reason: Option<PlaybackEndReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_stopped_and_not_ready() {
        let status = PlayerStatus::default();
        assert_eq!(status.transport, TransportState::Stopped);
        assert!(!status.is_player_ready);
        assert!(!status.is_playing);
        assert_eq!(status.meter_level, 0.0);
    }

    #[test]
    fn transport_state_serializes_snake_case() {
        let json = serde_json::to_string(&TransportState::Playing).unwrap();
        assert_eq!(json, "\"playing\"");
        let reason: PlaybackEndReason = serde_json::from_str("\"eof\"").unwrap();
        assert_eq!(reason, PlaybackEndReason::Eof);
    }
}
