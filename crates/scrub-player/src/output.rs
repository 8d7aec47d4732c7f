//! cpal-backed transport.
//!
//! Renders the loaded [`AudioTrack`] straight from memory in the cpal output
//! callback. The callback:
//! - takes the render cursor with `try_lock` and outputs silence if the control
//!   side holds it, so it never waits on the engine
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - feeds the meter accumulator from the first output channel
//! - reports segment completion through a bounded channel with `try_send`
//!
//! A small dispatcher thread turns completion reports into the engine's
//! [`SegmentCallback`], so callbacks never run on the audio thread.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::config::PlayerConfig;
use crate::device;
use crate::error::PlayerError;
use crate::meter::{MeterAccumulator, MeterMailbox};
use crate::scrub::ScrubSweep;
use crate::seek::Segment;
use crate::track::AudioTrack;
use crate::transport::{AudioBackend, SegmentCallback, SegmentEnd, Transport};

/// Report from the render callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RenderEvent {
    Finished { generation: u64 },
}

/// Cursor state shared between the control side and the render callback.
#[derive(Debug, Default)]
struct RenderCursor {
    segment: Option<Segment>,
    /// Next absolute frame to render.
    cursor: i64,
    /// Frames rendered in the current pass of the segment.
    pass_frames: i64,
    running: bool,
    generation: u64,
    /// Frame the next scrub sweep starts from.
    scrub_from: i64,
}

impl RenderCursor {
    /// Advance by one output frame. Returns the source frame to render, if any,
    /// and whether the segment just finished.
    fn advance(&mut self) -> (Option<i64>, bool) {
        if !self.running {
            return (None, false);
        }
        let Some(segment) = self.segment else {
            return (None, false);
        };
        if self.cursor >= segment.end_frame {
            return (None, false);
        }
        let frame = self.cursor;
        self.cursor += 1;
        self.pass_frames += 1;

        if self.cursor >= segment.end_frame {
            if segment.looping {
                self.cursor = segment.start_frame;
                self.pass_frames = 0;
            } else {
                self.segment = None;
                self.running = false;
                return (Some(frame), true);
            }
        }
        (Some(frame), false)
    }
}

struct RenderShared {
    cursor: Mutex<RenderCursor>,
    render_frame: AtomicI64,
    scrubbing: AtomicBool,
    scrub_target: AtomicI64,
}

impl RenderShared {
    fn new() -> Self {
        Self {
            cursor: Mutex::new(RenderCursor::default()),
            render_frame: AtomicI64::new(0),
            scrubbing: AtomicBool::new(false),
            scrub_target: AtomicI64::new(0),
        }
    }
}

type PendingCallback = Arc<Mutex<Option<(u64, SegmentCallback)>>>;

/// Opens cpal output sessions on a chosen device.
pub struct CpalBackend {
    device: Option<String>,
    config: PlayerConfig,
    meter: Arc<MeterMailbox>,
}

impl CpalBackend {
    /// `device` selects an output by case-insensitive substring; `None` uses the default.
    pub fn new(device: Option<String>, config: PlayerConfig) -> Self {
        Self {
            device,
            config,
            meter: Arc::new(MeterMailbox::new()),
        }
    }

    /// Mailbox the render tap posts meter levels into.
    pub fn meter(&self) -> Arc<MeterMailbox> {
        self.meter.clone()
    }
}

impl AudioBackend for CpalBackend {
    type Transport = CpalTransport;

    fn activate(&mut self, track: &AudioTrack) -> Result<CpalTransport, PlayerError> {
        CpalTransport::open(self.device.as_deref(), track, &self.config, self.meter.clone())
            .map_err(PlayerError::activation)
    }
}

/// Transport over a running cpal output stream.
pub struct CpalTransport {
    shared: Arc<RenderShared>,
    pending: PendingCallback,
    _stream: cpal::Stream,
}

impl CpalTransport {
    fn open(
        device_name: Option<&str>,
        track: &AudioTrack,
        cfg: &PlayerConfig,
        meter: Arc<MeterMailbox>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, device_name)?;
        let track_rate = track.sample_rate().round() as u32;
        let config = device::pick_output_config(&device, Some(track_rate))?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if stream_config.sample_rate != track_rate {
            return Err(anyhow!(
                "device runs at {} Hz but the track is {} Hz",
                stream_config.sample_rate,
                track_rate
            ));
        }
        if let Some(buf) = device::pick_buffer_size(&config) {
            stream_config.buffer_size = buf;
        }

        let shared = Arc::new(RenderShared::new());
        let pending: PendingCallback = Arc::new(Mutex::new(None));
        let (events_tx, events_rx) = crossbeam_channel::bounded(cfg.event_capacity.max(1));

        let stream = build_output_stream(
            &device,
            &stream_config,
            config.sample_format(),
            RenderContext {
                track: track.clone(),
                shared: shared.clone(),
                meter,
                events: events_tx,
                scrub_audition: cfg.scrub_audition,
            },
        )?;
        stream.play().context("start output stream")?;
        spawn_dispatcher(events_rx, pending.clone());

        tracing::info!(
            device = %device.description().map(|d| d.to_string()).unwrap_or_default(),
            rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            format = ?config.sample_format(),
            "output session active"
        );

        Ok(Self {
            shared,
            pending,
            _stream: stream,
        })
    }
}

impl Transport for CpalTransport {
    fn schedule(&mut self, segment: Segment, on_complete: SegmentCallback) -> Result<(), PlayerError> {
        let mut cur = self
            .shared
            .cursor
            .lock()
            .map_err(|_| PlayerError::Schedule("render state poisoned".to_string()))?;
        if cur.segment.is_some() {
            return Err(PlayerError::Schedule("segment already scheduled".to_string()));
        }
        if segment.frames() <= 0 {
            return Err(PlayerError::Schedule(format!(
                "empty segment [{}, {})",
                segment.start_frame, segment.end_frame
            )));
        }
        cur.generation = cur.generation.wrapping_add(1);
        cur.segment = Some(segment);
        cur.cursor = segment.start_frame;
        cur.pass_frames = 0;
        cur.running = false;
        self.shared.render_frame.store(0, Ordering::Relaxed);
        if let Ok(mut p) = self.pending.lock() {
            *p = Some((cur.generation, on_complete));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), PlayerError> {
        let mut cur = self
            .shared
            .cursor
            .lock()
            .map_err(|_| PlayerError::Schedule("render state poisoned".to_string()))?;
        if cur.segment.is_none() {
            return Err(PlayerError::Schedule("nothing scheduled".to_string()));
        }
        cur.running = true;
        Ok(())
    }

    fn pause(&mut self) {
        if let Ok(mut cur) = self.shared.cursor.lock() {
            cur.running = false;
        }
    }

    fn stop(&mut self) {
        if let Ok(mut cur) = self.shared.cursor.lock() {
            cur.segment = None;
            cur.running = false;
            cur.pass_frames = 0;
        }
        self.shared.render_frame.store(0, Ordering::Relaxed);
        let pending = self.pending.lock().ok().and_then(|mut p| p.take());
        if let Some((_, cb)) = pending {
            cb(SegmentEnd::Interrupted);
        }
    }

    fn current_render_frame(&self) -> i64 {
        self.shared.render_frame.load(Ordering::Relaxed)
    }

    fn set_scrub_target(&mut self, frame: Option<i64>) {
        match frame {
            Some(frame) => {
                if !self.shared.scrubbing.load(Ordering::Relaxed) {
                    if let Ok(mut cur) = self.shared.cursor.lock() {
                        cur.scrub_from = frame;
                    }
                }
                self.shared.scrub_target.store(frame, Ordering::Relaxed);
                self.shared.scrubbing.store(true, Ordering::Release);
            }
            None => self.shared.scrubbing.store(false, Ordering::Release),
        }
    }
}

/// Deliver completion reports to the pending callback of the matching generation.
///
/// Exits once the stream (and with it the sender) is dropped.
fn spawn_dispatcher(events: Receiver<RenderEvent>, pending: PendingCallback) {
    std::thread::spawn(move || {
        while let Ok(event) = events.recv() {
            let RenderEvent::Finished { generation } = event;
            let cb = pending.lock().ok().and_then(|mut p| match p.take() {
                Some((g, cb)) if g == generation => Some(cb),
                other => {
                    *p = other;
                    None
                }
            });
            match cb {
                Some(cb) => cb(SegmentEnd::Finished),
                None => tracing::debug!(generation, "completion for a replaced segment"),
            }
        }
    });
}

/// Everything the render callback owns.
struct RenderContext {
    track: AudioTrack,
    shared: Arc<RenderShared>,
    meter: Arc<MeterMailbox>,
    events: Sender<RenderEvent>,
    scrub_audition: bool,
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ctx: RenderContext,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, ctx),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, ctx),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, ctx),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, ctx),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ctx: RenderContext,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| render(&ctx, data, channels_out),
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Render one output buffer. Runs on the audio thread.
fn render<T>(ctx: &RenderContext, data: &mut [T], channels_out: usize)
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
    let Ok(mut cur) = ctx.shared.cursor.try_lock() else {
        data.fill(silence);
        return;
    };

    let frames = data.len() / channels_out.max(1);
    let sweep = if ctx.scrub_audition && ctx.shared.scrubbing.load(Ordering::Acquire) {
        let target = ctx.shared.scrub_target.load(Ordering::Relaxed);
        let sweep = ScrubSweep::new(cur.scrub_from, target, frames);
        cur.scrub_from = sweep.end_frame();
        Some(sweep)
    } else {
        None
    };

    let was_running = cur.running;
    let mut meter = MeterAccumulator::new();
    let mut finished = None;
    for frame in 0..frames {
        let (segment_frame, done) = cur.advance();
        if done {
            finished = Some(cur.generation);
        }
        let source = match &sweep {
            Some(sweep) => sweep.source_frame(frame),
            None => segment_frame,
        };
        for ch in 0..channels_out {
            let sample = source
                .map(|f| mapped_sample(&ctx.track, f, channels_out, ch))
                .unwrap_or(0.0);
            if ch == 0 {
                meter.push(sample);
            }
            data[frame * channels_out + ch] = <T as cpal::Sample>::from_sample::<f32>(sample);
        }
    }
    for sample in data[frames * channels_out..].iter_mut() {
        *sample = silence;
    }

    ctx.shared
        .render_frame
        .store(cur.pass_frames, Ordering::Relaxed);
    drop(cur);

    if was_running {
        ctx.meter.post(meter.level());
    }
    if let Some(generation) = finished {
        // Never blocks; a full channel means the dispatcher is gone.
        let _ = ctx.events.try_send(RenderEvent::Finished { generation });
    }
}

/// Read one output sample for `dst_ch`, applying a simple channel mapping.
///
/// Mapping rules:
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - stereo → stereo: pass-through
/// - other layouts: best-effort “clamp to available channels”
fn mapped_sample(track: &AudioTrack, frame: i64, dst_channels: usize, dst_ch: usize) -> f32 {
    let Some(src) = track.frame(frame) else {
        return 0.0;
    };
    let get = |ch: usize| src.get(ch).copied().unwrap_or(0.0);
    match (src.len(), dst_channels) {
        (1, 1) => get(0),
        (2, 2) => get(dst_ch.min(1)),
        (2, 1) => 0.5 * (get(0) + get(1)),
        (1, 2) => get(0),
        (n, _) => get(dst_ch.min(n.saturating_sub(1))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor_with(segment: Segment) -> RenderCursor {
        RenderCursor {
            segment: Some(segment),
            cursor: segment.start_frame,
            running: true,
            generation: 1,
            ..RenderCursor::default()
        }
    }

    #[test]
    fn advance_finishes_non_looping_segment() {
        let mut cur = cursor_with(Segment { start_frame: 2, end_frame: 4, looping: false });
        assert_eq!(cur.advance(), (Some(2), false));
        assert_eq!(cur.advance(), (Some(3), true));
        assert_eq!(cur.pass_frames, 2);
        assert!(cur.segment.is_none());
        assert_eq!(cur.advance(), (None, false));
    }

    #[test]
    fn advance_wraps_looping_segment_and_restarts_pass() {
        let mut cur = cursor_with(Segment { start_frame: 0, end_frame: 2, looping: true });
        assert_eq!(cur.advance(), (Some(0), false));
        assert_eq!(cur.advance(), (Some(1), false));
        assert_eq!(cur.pass_frames, 0);
        assert_eq!(cur.advance(), (Some(0), false));
        assert_eq!(cur.pass_frames, 1);
    }

    #[test]
    fn advance_holds_while_paused() {
        let mut cur = cursor_with(Segment { start_frame: 0, end_frame: 10, looping: false });
        cur.running = false;
        assert_eq!(cur.advance(), (None, false));
        assert_eq!(cur.pass_frames, 0);
    }

    #[test]
    fn mapped_sample_handles_layouts() {
        let stereo = AudioTrack::from_interleaved(vec![0.2, 0.4], 2, 10.0).unwrap();
        assert_eq!(mapped_sample(&stereo, 0, 2, 1), 0.4);
        assert!((mapped_sample(&stereo, 0, 1, 0) - 0.3).abs() < 1e-6);
        assert_eq!(mapped_sample(&stereo, 1, 2, 0), 0.0);

        let mono = AudioTrack::from_interleaved(vec![0.5], 1, 10.0).unwrap();
        assert_eq!(mapped_sample(&mono, 0, 2, 1), 0.5);
    }

    fn context(track: AudioTrack, scrub_audition: bool) -> (RenderContext, Receiver<RenderEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(4);
        (
            RenderContext {
                track,
                shared: Arc::new(RenderShared::new()),
                meter: Arc::new(MeterMailbox::new()),
                events: tx,
                scrub_audition,
            },
            rx,
        )
    }

    #[test]
    fn render_plays_segment_and_reports_completion() {
        let track = AudioTrack::from_interleaved(vec![0.1, 0.2, 0.3], 1, 10.0).unwrap();
        let (ctx, rx) = context(track, false);
        {
            let mut cur = ctx.shared.cursor.lock().unwrap();
            *cur = cursor_with(Segment { start_frame: 1, end_frame: 3, looping: false });
            cur.generation = 7;
        }
        let mut out = [0.0f32; 8];
        render(&ctx, &mut out, 2);

        assert_eq!(out, [0.2, 0.2, 0.3, 0.3, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(ctx.shared.render_frame.load(Ordering::Relaxed), 2);
        assert_eq!(rx.try_recv().unwrap(), RenderEvent::Finished { generation: 7 });
        assert!(ctx.meter.take().is_some());
    }

    #[test]
    fn render_outputs_silence_when_cursor_is_busy() {
        let track = AudioTrack::from_interleaved(vec![0.5; 4], 1, 10.0).unwrap();
        let (ctx, _rx) = context(track, false);
        let _held = ctx.shared.cursor.lock().unwrap();
        let mut out = [1.0f32; 4];
        render(&ctx, &mut out, 1);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn render_sweeps_toward_scrub_target() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let track = AudioTrack::from_interleaved(samples, 1, 10.0).unwrap();
        let (ctx, _rx) = context(track, true);
        {
            let mut cur = ctx.shared.cursor.lock().unwrap();
            *cur = cursor_with(Segment { start_frame: 0, end_frame: 10, looping: false });
            cur.scrub_from = 2;
        }
        ctx.shared.scrub_target.store(6, Ordering::Relaxed);
        ctx.shared.scrubbing.store(true, Ordering::Relaxed);

        let mut out = [0.0f32; 4];
        render(&ctx, &mut out, 1);
        assert_eq!(out, [2.0, 3.0, 4.0, 5.0]);
        // The segment keeps advancing silently underneath.
        assert_eq!(ctx.shared.render_frame.load(Ordering::Relaxed), 4);

        render(&ctx, &mut out, 1);
        assert_eq!(out, [0.0; 4]);
    }
}
