//! Seek target computation and replay planning.
//!
//! Every request is clamped to `[0, length]`; out-of-range requests are never errors.

/// Where a seek should land.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SeekRequest {
    /// Offset from the current position, in seconds (negative rewinds).
    Relative { offset_seconds: f64 },
    /// Absolute position.
    Absolute(AbsoluteTarget),
}

/// Absolute seek target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AbsoluteTarget {
    Seconds(f64),
    /// Progress percentage in `[0, 100]`.
    Percent(f64),
}

/// Skip direction for the fixed-offset transport buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipDirection {
    Forward,
    Backward,
}

impl SkipDirection {
    /// Relative request for a skip of `offset_seconds` in this direction.
    pub fn request(self, offset_seconds: f64) -> SeekRequest {
        let magnitude = offset_seconds.abs();
        let offset_seconds = match self {
            SkipDirection::Forward => magnitude,
            SkipDirection::Backward => -magnitude,
        };
        SeekRequest::Relative { offset_seconds }
    }
}

/// A contiguous range `[start_frame, end_frame)` submitted to the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start_frame: i64,
    pub end_frame: i64,
    /// Restart at `start_frame` when `end_frame` is reached.
    pub looping: bool,
}

impl Segment {
    pub fn frames(&self) -> i64 {
        self.end_frame - self.start_frame
    }
}

/// What the engine must schedule after a seek.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayPlan {
    /// Play the remainder of the buffer from the target.
    Segment(Segment),
    /// Target is at the end; nothing is scheduled.
    EndOfTrack,
}

/// Compute the clamped target frame for `request`.
pub fn compute_seek(
    request: SeekRequest,
    current_frame: i64,
    length_in_frames: i64,
    sample_rate: f64,
) -> i64 {
    let target = match request {
        SeekRequest::Relative { offset_seconds } => {
            current_frame.saturating_add(seconds_to_frames(offset_seconds, sample_rate))
        }
        SeekRequest::Absolute(AbsoluteTarget::Seconds(seconds)) => {
            seconds_to_frames(seconds, sample_rate)
        }
        SeekRequest::Absolute(AbsoluteTarget::Percent(percent)) => {
            crate::clock::percent_to_frame(percent, length_in_frames)
        }
    };
    target.clamp(0, length_in_frames)
}

/// Replay segment for a target frame: the remainder of the buffer, never a loop.
pub fn plan_replay(target_frame: i64, length_in_frames: i64) -> ReplayPlan {
    if target_frame >= length_in_frames {
        return ReplayPlan::EndOfTrack;
    }
    ReplayPlan::Segment(Segment {
        start_frame: target_frame.max(0),
        end_frame: length_in_frames,
        looping: false,
    })
}

/// Seconds to frames, truncated toward zero. Non-finite input maps to 0 frames;
/// the float→int cast saturates on overflow.
fn seconds_to_frames(seconds: f64, sample_rate: f64) -> i64 {
    let frames = seconds * sample_rate;
    if frames.is_nan() {
        return 0;
    }
    frames as i64
}
