//! Render/transport collaborator contract.
//!
//! The engine only talks to audio output through these traits. The cpal
//! implementation lives in [`crate::output`]; tests drive the engine with fakes.

use crate::error::PlayerError;
use crate::seek::Segment;
use crate::track::AudioTrack;

/// How a scheduled segment stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentEnd {
    /// The render cursor reached the end of a non-looping segment.
    Finished,
    /// The segment was stopped before it finished.
    Interrupted,
}

/// Completion callback handed to [`Transport::schedule`].
///
/// May be invoked from a transport-owned thread; it must only post, never block.
pub type SegmentCallback = Box<dyn FnOnce(SegmentEnd) + Send + 'static>;

/// A single playback cursor over an activated output session.
pub trait Transport {
    /// Queue `segment`. At most one segment is scheduled at a time.
    fn schedule(&mut self, segment: Segment, on_complete: SegmentCallback) -> Result<(), PlayerError>;

    /// Start (or resume) rendering the scheduled segment.
    fn start(&mut self) -> Result<(), PlayerError>;

    /// Hold the render clock without dropping the segment.
    fn pause(&mut self);

    /// Drop the scheduled segment and reset the render clock to 0.
    fn stop(&mut self);

    /// Frames rendered since the current pass of the segment began.
    ///
    /// Looping segments restart this count at every pass.
    fn current_render_frame(&self) -> i64;

    /// Scrub audition target, or `None` to leave scrub audition.
    fn set_scrub_target(&mut self, _frame: Option<i64>) {}
}

/// Opens output sessions for loaded tracks.
pub trait AudioBackend: Send {
    type Transport: Transport;

    /// Activate an output session able to render `track`.
    fn activate(&mut self, track: &AudioTrack) -> Result<Self::Transport, PlayerError>;
}
