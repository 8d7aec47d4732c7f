//! Level metering for the output tap.
//!
//! The render callback feeds samples into a [`MeterAccumulator`] without allocating,
//! turns the result into a [`MeterLevel`] and posts it through a [`MeterMailbox`].
//! The engine context takes the latest value on its next tick and decides whether
//! to publish it (only while playing).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Floor of the meter range in dBFS.
pub const MIN_DB: f32 = -80.0;

/// Normalized loudness in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeterLevel {
    pub normalized: f32,
}

impl MeterLevel {
    pub const SILENT: MeterLevel = MeterLevel { normalized: 0.0 };
}

/// Map an average power (dBFS) onto `[0, 1]`.
///
/// - non-finite → 0
/// - below [`MIN_DB`] → 0
/// - above full scale (positive dB) → 1
/// - otherwise linear in dB between [`MIN_DB`] and 0
pub fn scaled_power(power: f32) -> f32 {
    if !power.is_finite() {
        return 0.0;
    }
    if power < MIN_DB {
        0.0
    } else if power > 0.0 {
        1.0
    } else {
        (MIN_DB.abs() - power.abs()) / MIN_DB.abs()
    }
}

/// Running sum of squares for one tap invocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeterAccumulator {
    sum_sq: f32,
    count: u32,
}

impl MeterAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.sum_sq += sample * sample;
        self.count += 1;
    }

    /// RMS over the pushed samples, or `None` when nothing was pushed.
    pub fn rms(&self) -> Option<f32> {
        if self.count == 0 {
            return None;
        }
        Some((self.sum_sq / self.count as f32).sqrt())
    }

    /// Convert to a meter level. An empty accumulator reads as silence.
    pub fn level(&self) -> MeterLevel {
        match self.rms() {
            Some(rms) => MeterLevel {
                normalized: scaled_power(20.0 * rms.log10()),
            },
            None => MeterLevel::SILENT,
        }
    }
}

/// Compute the level of a chunk, reading every `frame_stride`-th sample.
///
/// For interleaved buffers pass the channel count to meter the first channel.
/// A stride below 1 is treated as 1.
pub fn process(chunk: &[f32], frame_stride: i32) -> MeterLevel {
    let stride = frame_stride.max(1) as usize;
    let mut acc = MeterAccumulator::new();
    for sample in chunk.iter().step_by(stride) {
        acc.push(*sample);
    }
    acc.level()
}

/// Single-slot, latest-value-wins handoff from the render context.
///
/// Both sides only touch atomics, so the render callback never blocks on it.
#[derive(Debug, Default)]
pub struct MeterMailbox {
    bits: AtomicU32,
    fresh: AtomicBool,
}

impl MeterMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot with `level`.
    pub fn post(&self, level: MeterLevel) {
        self.bits.store(level.normalized.to_bits(), Ordering::Relaxed);
        self.fresh.store(true, Ordering::Release);
    }

    /// Take the latest posted level, if one arrived since the last take.
    pub fn take(&self) -> Option<MeterLevel> {
        if !self.fresh.swap(false, Ordering::Acquire) {
            return None;
        }
        Some(MeterLevel {
            normalized: f32::from_bits(self.bits.load(Ordering::Relaxed)),
        })
    }
}
