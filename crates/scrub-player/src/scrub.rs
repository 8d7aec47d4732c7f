//! Scrub gesture state machine and scrub audition sweep.
//!
//! While scrubbing, the displayed progress follows the gesture and the engine keeps
//! the render position running underneath. Releasing commits a single seek.

use crate::clock::percent_to_frame;
use crate::seek::{AbsoluteTarget, SeekRequest};

/// State captured for one scrub gesture.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrubSession {
    pub active: bool,
    pub was_playing_before_scrub: bool,
    pub last_scrub_frame: i64,
    /// Last percent seen, clamped to `[0, 100]`.
    pub last_scrub_percent: f64,
}

/// What the engine must do when a scrub gesture is released.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrubRelease {
    /// Seek to commit.
    pub request: SeekRequest,
    /// Frame recorded by the last update.
    pub target_frame: i64,
    /// Restart playback after the seek.
    pub resume: bool,
}

/// Idle ⇄ Scrubbing state machine. At most one session exists at a time.
#[derive(Debug, Default)]
pub struct ScrubCoordinator {
    session: Option<ScrubSession>,
}

impl ScrubCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_scrubbing(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&ScrubSession> {
        self.session.as_ref()
    }

    /// Enter Scrubbing. Returns `false` (and changes nothing) when already scrubbing.
    ///
    /// `start_frame`/`start_percent` seed the session so a release without any
    /// update lands where the gesture started.
    pub fn begin_scrub(&mut self, is_playing: bool, start_frame: i64, start_percent: f64) -> bool {
        if self.session.is_some() {
            return false;
        }
        self.session = Some(ScrubSession {
            active: true,
            was_playing_before_scrub: is_playing,
            last_scrub_frame: start_frame,
            last_scrub_percent: start_percent,
        });
        true
    }

    /// Record a gesture position. Returns the recorded frame, or `None` when idle.
    pub fn update_scrub(&mut self, percent: f64, length_in_frames: i64) -> Option<i64> {
        let session = self.session.as_mut()?;
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            session.last_scrub_percent
        };
        session.last_scrub_percent = percent;
        session.last_scrub_frame = percent_to_frame(percent, length_in_frames);
        Some(session.last_scrub_frame)
    }

    /// Leave Scrubbing, consuming the session. `None` when idle.
    pub fn end_scrub(&mut self) -> Option<ScrubRelease> {
        let session = self.session.take()?;
        Some(ScrubRelease {
            request: SeekRequest::Absolute(AbsoluteTarget::Percent(session.last_scrub_percent)),
            target_frame: session.last_scrub_frame,
            resume: session.was_playing_before_scrub,
        })
    }

    /// Drop any session without committing (track replaced).
    pub fn cancel(&mut self) {
        self.session = None;
    }
}

/// One render period of scrub audition.
///
/// Sweeps linearly from the previously auditioned frame to the scrub target across
/// `period_frames` output frames. Source frames past the target in the direction of
/// travel are silent, and no movement means silence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrubSweep {
    from_frame: i64,
    to_frame: i64,
    stride: f64,
}

impl ScrubSweep {
    pub fn new(from_frame: i64, to_frame: i64, period_frames: usize) -> Self {
        let stride = if period_frames == 0 {
            0.0
        } else {
            (to_frame - from_frame) as f64 / period_frames as f64
        };
        Self { from_frame, to_frame, stride }
    }

    pub fn is_still(&self) -> bool {
        self.from_frame == self.to_frame
    }

    /// Source frame for output frame `index`, or `None` for silence.
    pub fn source_frame(&self, index: usize) -> Option<i64> {
        if self.is_still() {
            return None;
        }
        let frame = self.from_frame + (index as f64 * self.stride) as i64;
        let within = if self.to_frame > self.from_frame {
            frame <= self.to_frame
        } else {
            frame >= self.to_frame
        };
        within.then_some(frame)
    }

    /// Frame the next period starts from.
    pub fn end_frame(&self) -> i64 {
        self.to_frame
    }
}
