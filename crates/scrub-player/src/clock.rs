//! Progress clock: render position → displayed progress.
//!
//! Position is derived from the absolute render frame on every call, so irregular
//! or missed ticks never accumulate drift.

/// Derived progress for one display refresh.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Progress in `[0, 100]`.
    pub percent: f64,
    pub elapsed_seconds: f64,
    pub remaining_seconds: f64,
}

impl ProgressSnapshot {
    pub fn elapsed_text(&self) -> String {
        format_time(self.elapsed_seconds)
    }

    pub fn remaining_text(&self) -> String {
        format_time(self.remaining_seconds)
    }
}

/// Result of a single [`tick`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClockReading {
    pub snapshot: ProgressSnapshot,
    /// Render frame plus seek frame, clamped to `[0, length]`.
    pub current_frame: i64,
    /// Advisory only: the engine reacts to transport completion, not to this flag.
    pub end_of_track: bool,
}

/// Compute the displayed progress for a render position.
///
/// `length_in_frames` must be positive and `sample_rate` finite and positive.
pub fn tick(
    render_frame: i64,
    seek_frame: i64,
    length_in_frames: i64,
    sample_rate: f64,
) -> ClockReading {
    let current_frame = render_frame
        .saturating_add(seek_frame)
        .clamp(0, length_in_frames);
    let end_of_track = current_frame >= length_in_frames;

    let total_seconds = length_in_frames as f64 / sample_rate;
    let elapsed_seconds = current_frame as f64 / sample_rate;
    let percent = current_frame as f64 / length_in_frames as f64 * 100.0;

    ClockReading {
        snapshot: ProgressSnapshot {
            percent,
            elapsed_seconds,
            remaining_seconds: total_seconds - elapsed_seconds,
        },
        current_frame,
        end_of_track,
    }
}

/// Frame index for a progress percentage, truncated toward zero.
pub fn percent_to_frame(percent: f64, length_in_frames: i64) -> i64 {
    if !percent.is_finite() {
        return 0;
    }
    let frame = (percent / 100.0 * length_in_frames as f64) as i64;
    frame.clamp(0, length_in_frames)
}

/// Positional time text: `MM:SS`, or `H:MM:SS` from one hour on.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
