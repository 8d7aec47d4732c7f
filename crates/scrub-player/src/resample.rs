//! Offline sample-rate conforming.
//!
//! Uses Rubato to convert a decoded [`AudioTrack`] to the output device rate once,
//! before it is loaded. The render callback then plays frames 1:1, so seek and
//! progress math never has to cross rates.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::error::PlayerError;
use crate::track::AudioTrack;

/// Input frames fed to the resampler per call.
const CHUNK_FRAMES: usize = 1024;

/// Resample `track` to `dst_rate`.
///
/// Returns a copy when the rates already match. The result holds
/// `round(length * dst_rate / src_rate)` frames, with the resampler delay removed.
pub fn conform_track(track: &AudioTrack, dst_rate: u32) -> Result<AudioTrack, PlayerError> {
    if dst_rate == 0 {
        return Err(PlayerError::Decode("output rate must be positive".into()));
    }
    if track.sample_rate() == dst_rate as f64 {
        return Ok(track.clone());
    }

    let samples = resample_interleaved(
        track.samples(),
        track.channels(),
        track.sample_rate(),
        dst_rate as f64,
    )
    .map_err(PlayerError::decode)?;

    tracing::info!(
        src_hz = track.sample_rate(),
        dst_hz = dst_rate,
        frames = samples.len() / track.channels(),
        "track conformed to output rate"
    );
    AudioTrack::from_interleaved(samples, track.channels(), dst_rate as f64)
}

fn resample_interleaved(
    input: &[f32],
    channels: usize,
    src_rate: f64,
    dst_rate: f64,
) -> Result<Vec<f32>> {
    let f_ratio = dst_rate / src_rate;
    let in_frames = input.len() / channels;
    let want_frames = (in_frames as f64 * f_ratio).round() as usize;

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };

    let mut resampler =
        Async::<f32>::new_sinc(f_ratio, 1.1, &params, CHUNK_FRAMES, channels, FixedAsync::Input)
            .map_err(|e| anyhow!("resampler init: {e}"))?;

    let delay = resampler.output_delay();
    let out_capacity_frames = (CHUNK_FRAMES as f64 * f_ratio * 1.2).ceil() as usize + 64;
    let mut out_chunk = vec![0.0f32; out_capacity_frames * channels];
    let mut out = Vec::with_capacity((want_frames + delay) * channels);
    let silence = vec![0.0f32; CHUNK_FRAMES * channels];

    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    let mut pos = 0usize;
    while out.len() / channels < want_frames + delay {
        let remaining = in_frames.saturating_sub(pos);
        let (chunk, frames, partial) = if remaining >= CHUNK_FRAMES {
            let start = pos * channels;
            (&input[start..start + CHUNK_FRAMES * channels], CHUNK_FRAMES, None)
        } else if remaining > 0 {
            let start = pos * channels;
            (&input[start..], remaining, Some(remaining))
        } else {
            // Flush the filter tail with silence.
            (&silence[..], CHUNK_FRAMES, None)
        };
        pos += frames.min(remaining);

        let input_adapter = InterleavedSlice::new(chunk, channels, frames)
            .map_err(|e| anyhow!("interleaved slice (input): {e}"))?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut out_chunk, channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output): {e}"))?;

        indexing.partial_len = partial;
        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler process: {e}"))?;
        out.extend_from_slice(&out_chunk[..nbr_out * channels]);
    }

    let start = delay * channels;
    let end = (delay + want_frames) * channels;
    Ok(out[start..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(rate: f64, freq: f64, frames: usize, channels: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let v = (2.0 * std::f64::consts::PI * freq * i as f64 / rate).sin() as f32 * 0.5;
            for _ in 0..channels {
                out.push(v);
            }
        }
        out
    }

    #[test]
    fn matching_rate_is_a_copy() {
        let track = AudioTrack::from_interleaved(vec![0.1, 0.2, 0.3], 1, 48_000.0).unwrap();
        let out = conform_track(&track, 48_000).unwrap();
        assert_eq!(out.samples(), track.samples());
        assert_eq!(out.sample_rate(), 48_000.0);
    }

    #[test]
    fn zero_output_rate_is_rejected() {
        let track = AudioTrack::from_interleaved(vec![0.1], 1, 48_000.0).unwrap();
        assert!(conform_track(&track, 0).is_err());
    }

    #[test]
    fn upsampling_scales_length() {
        let track =
            AudioTrack::from_interleaved(sine(44_100.0, 440.0, 4_410, 2), 2, 44_100.0).unwrap();
        let out = conform_track(&track, 48_000).unwrap();
        assert_eq!(out.sample_rate(), 48_000.0);
        assert_eq!(out.channels(), 2);
        assert_eq!(out.length_in_frames(), 4_800);
    }

    #[test]
    fn downsampling_keeps_signal_level() {
        let track =
            AudioTrack::from_interleaved(sine(48_000.0, 440.0, 9_600, 1), 1, 48_000.0).unwrap();
        let out = conform_track(&track, 24_000).unwrap();
        assert_eq!(out.length_in_frames(), 4_800);

        let mid = &out.samples()[1_000..3_000];
        let peak = mid.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(peak > 0.4 && peak < 0.6, "peak {peak}");
    }

    #[test]
    fn short_track_survives_partial_chunk() {
        let track =
            AudioTrack::from_interleaved(sine(22_050.0, 220.0, 100, 1), 1, 22_050.0).unwrap();
        let out = conform_track(&track, 44_100).unwrap();
        assert_eq!(out.length_in_frames(), 200);
    }
}
