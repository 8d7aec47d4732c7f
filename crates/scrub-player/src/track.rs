//! Immutable decoded track buffer.

use std::sync::Arc;

use crate::error::PlayerError;

/// A fully decoded track held in memory.
///
/// Samples are interleaved `f32` and shared read-only with the render context.
/// `length_in_frames` always equals `samples.len() / channels` and is never zero.
#[derive(Clone, Debug)]
pub struct AudioTrack {
    samples: Arc<[f32]>,
    channels: usize,
    sample_rate: f64,
    length_in_frames: i64,
}

impl AudioTrack {
    /// Build a track from interleaved samples.
    ///
    /// Fails with [`PlayerError::Decode`] when the buffer is empty, ragged, or the
    /// format is unusable.
    pub fn from_interleaved(
        samples: Vec<f32>,
        channels: usize,
        sample_rate: f64,
    ) -> Result<Self, PlayerError> {
        if channels == 0 {
            return Err(PlayerError::Decode("track has no channels".to_string()));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PlayerError::Decode(format!(
                "invalid sample rate: {sample_rate}"
            )));
        }
        if samples.len() % channels != 0 {
            return Err(PlayerError::Decode(format!(
                "{} samples do not divide into {channels} channels",
                samples.len()
            )));
        }
        let frames = samples.len() / channels;
        if frames == 0 {
            return Err(PlayerError::Decode("track is empty".to_string()));
        }
        let length_in_frames = i64::try_from(frames)
            .map_err(|_| PlayerError::Decode(format!("track too long: {frames} frames")))?;

        Ok(Self {
            samples: samples.into(),
            channels,
            sample_rate,
            length_in_frames,
        })
    }

    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn length_in_frames(&self) -> i64 {
        self.length_in_frames
    }

    /// Track duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.length_in_frames as f64 / self.sample_rate
    }

    /// Interleaved samples of a single frame, or `None` past the end.
    pub fn frame(&self, index: i64) -> Option<&[f32]> {
        if index < 0 || index >= self.length_in_frames {
            return None;
        }
        let start = index as usize * self.channels;
        Some(&self.samples[start..start + self.channels])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_interleaved_computes_length() {
        let track = AudioTrack::from_interleaved(vec![0.0; 8], 2, 100.0).unwrap();
        assert_eq!(track.length_in_frames(), 4);
        assert_eq!(track.channels(), 2);
        assert_eq!(track.duration_seconds(), 0.04);
    }

    #[test]
    fn from_interleaved_rejects_empty() {
        let err = AudioTrack::from_interleaved(Vec::new(), 2, 48_000.0).unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));
    }

    #[test]
    fn from_interleaved_rejects_ragged_buffer() {
        let err = AudioTrack::from_interleaved(vec![0.0; 5], 2, 48_000.0).unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));
    }

    #[test]
    fn from_interleaved_rejects_bad_format() {
        assert!(AudioTrack::from_interleaved(vec![0.0; 4], 0, 48_000.0).is_err());
        assert!(AudioTrack::from_interleaved(vec![0.0; 4], 1, 0.0).is_err());
        assert!(AudioTrack::from_interleaved(vec![0.0; 4], 1, f64::NAN).is_err());
    }

    #[test]
    fn frame_returns_interleaved_slice() {
        let track = AudioTrack::from_interleaved(vec![1.0, 2.0, 3.0, 4.0], 2, 10.0).unwrap();
        assert_eq!(track.frame(1), Some(&[3.0, 4.0][..]));
        assert_eq!(track.frame(2), None);
        assert_eq!(track.frame(-1), None);
    }
}
