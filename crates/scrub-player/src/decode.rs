//! Whole-track decode.
//!
//! Uses Symphonia to:
//! - probe the input container/codec
//! - decode every packet of the default track into interleaved `f32`
//! - hand back an immutable [`AudioTrack`] ready to load

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::CodecParameters;
use symphonia::core::io::MediaSource;
use symphonia::core::{
    codecs::DecoderOptions, formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions,
    probe::Hint,
};

use crate::error::PlayerError;
use crate::track::AudioTrack;

/// Metadata captured while probing the source.
#[derive(Clone, Debug, Default)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Source bit depth (best-effort).
    pub bit_depth: Option<u16>,
    /// Container/extension hint (best-effort).
    pub container: Option<String>,
}

/// Decode a local file into memory.
pub fn load_track(path: &Path) -> Result<(AudioTrack, SourceInfo), PlayerError> {
    let file = File::open(path)
        .with_context(|| format!("open {path:?}"))
        .map_err(PlayerError::decode)?;

    let mut hint = Hint::new();
    let ext = path.extension().and_then(|e| e.to_str());
    if let Some(ext) = ext {
        hint.with_extension(ext);
    }

    let (track, mut info) = load_track_from_media_source(Box::new(file), hint)?;
    info.container = ext.map(|e| e.to_ascii_uppercase());
    Ok((track, info))
}

/// Decode an arbitrary Symphonia [`MediaSource`] into memory.
pub fn load_track_from_media_source(
    source: Box<dyn MediaSource>,
    hint: Hint,
) -> Result<(AudioTrack, SourceInfo), PlayerError> {
    decode_all(source, hint).map_err(PlayerError::decode)
}

fn decode_all(source: Box<dyn MediaSource>, hint: Hint) -> Result<(AudioTrack, SourceInfo)> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("probe")?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let track_id = track.id;
    let codec_params: CodecParameters = track.codec_params.clone();

    let channels = codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    let rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;

    let info = SourceInfo {
        codec: codec_name_from_params(&codec_params),
        bit_depth: codec_params
            .bits_per_sample
            .or(codec_params.bits_per_coded_sample)
            .and_then(|v| u16::try_from(v).ok()),
        container: None,
    };

    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;
    let mut samples: Vec<f32> = Vec::with_capacity(capacity_hint(&codec_params, channels));
    let mut skipped = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break, // EOF
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        if decoded.spec().channels.count() != channels {
            return Err(anyhow!(
                "channel layout changed mid-stream ({} → {})",
                channels,
                decoded.spec().channels.count()
            ));
        }

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if skipped > 0 {
        tracing::warn!(skipped, "skipped undecodable packets");
    }
    tracing::debug!(
        frames = samples.len() / channels.max(1),
        rate_hz = rate,
        channels,
        codec = info.codec.as_deref().unwrap_or("unknown"),
        "track decoded"
    );

    let track = AudioTrack::from_interleaved(samples, channels, rate as f64)?;
    Ok((track, info))
}

/// Sample capacity to reserve from the container's frame count, capped at ten minutes of 48 kHz.
fn capacity_hint(codec_params: &CodecParameters, channels: usize) -> usize {
    const MAX_FRAMES: u64 = 48_000 * 600;
    let frames = codec_params.n_frames.unwrap_or(0).min(MAX_FRAMES);
    (frames as usize).saturating_mul(channels)
}

/// Best-effort codec label for logs and status output.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use symphonia::core::codecs::*;

    /// Minimal 16-bit PCM WAV with the given mono samples.
    fn wav_bytes(rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_wav_into_track() {
        let bytes = wav_bytes(8_000, &[0, 16_384, -16_384, 0]);
        let mut hint = Hint::new();
        hint.with_extension("wav");
        let (track, info) =
            load_track_from_media_source(Box::new(Cursor::new(bytes)), hint).unwrap();

        assert_eq!(track.length_in_frames(), 4);
        assert_eq!(track.channels(), 1);
        assert_eq!(track.sample_rate(), 8_000.0);
        assert!((track.samples()[1] - 0.5).abs() < 1e-3);
        assert_eq!(info.codec.as_deref(), Some("PCM_S16"));
    }

    #[test]
    fn garbage_input_is_a_decode_error() {
        let bytes = vec![0u8; 64];
        let err = load_track_from_media_source(Box::new(Cursor::new(bytes)), Hint::new())
            .unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));
    }

    #[test]
    fn empty_wav_is_a_decode_error() {
        let bytes = wav_bytes(8_000, &[]);
        let mut hint = Hint::new();
        hint.with_extension("wav");
        let err = load_track_from_media_source(Box::new(Cursor::new(bytes)), hint).unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let err = load_track(Path::new("/nonexistent/track.flac")).unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));
    }

    #[test]
    fn codec_name_from_params_maps_known_codecs() {
        let mut params = CodecParameters::new();
        params.codec = CODEC_TYPE_FLAC;
        assert_eq!(codec_name_from_params(&params), Some("FLAC".to_string()));
        params.codec = CODEC_TYPE_PCM_S16LE;
        assert_eq!(codec_name_from_params(&params), Some("PCM_S16".to_string()));
    }

    #[test]
    fn capacity_hint_is_capped() {
        let mut params = CodecParameters::new();
        params.n_frames = Some(u64::MAX);
        assert_eq!(capacity_hint(&params, 2), 48_000 * 600 * 2);
        params.n_frames = None;
        assert_eq!(capacity_hint(&params, 2), 0);
    }
}
