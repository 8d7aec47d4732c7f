//! Playback engine.
//!
//! Owns the loaded track, the transport state and the playback position, and
//! composes the clock, seek and scrub components on top of a [`Transport`].
//!
//! ## Ownership
//! Every method takes `&mut self` and is meant to run on one serialized context
//! (see [`crate::worker`]). The render context never touches engine state: it only
//! advances the transport's render clock, posts meter levels and reports segment
//! completion through [`EngineEvent`]s.
//!
//! ## End of track
//! Segment completion reported by the transport is the single authoritative
//! end-of-track signal. The clock's `end_of_track` flag only affects display.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::clock::{self, ProgressSnapshot};
use crate::config::PlayerConfig;
use crate::error::PlayerError;
use crate::meter::MeterMailbox;
use crate::scrub::ScrubCoordinator;
use crate::seek::{self, ReplayPlan, SeekRequest, Segment, SkipDirection};
use crate::status::{PlaybackEndReason, PlayerStatus, StatusBoard, TransportState};
use crate::track::AudioTrack;
use crate::transport::{AudioBackend, SegmentEnd, Transport};

/// Events posted back to the engine context by transport callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    Segment { generation: u64, end: SegmentEnd },
}

/// Seek origin and derived render position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackPosition {
    /// Frame the current segment started from.
    pub seek_frame: i64,
    /// `render_frame + seek_frame`, clamped to `[0, length]`.
    pub current_frame: i64,
}

pub struct PlaybackEngine<B: AudioBackend> {
    backend: B,
    config: PlayerConfig,
    board: StatusBoard,
    meter: Option<Arc<MeterMailbox>>,
    transport: Option<B::Transport>,
    track: Option<AudioTrack>,
    state: TransportState,
    position: PlaybackPosition,
    segment_scheduled: bool,
    generation: u64,
    scrub: ScrubCoordinator,
    progress: ProgressSnapshot,
    meter_level: f32,
    end_reason: Option<PlaybackEndReason>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
}

impl<B: AudioBackend> PlaybackEngine<B> {
    /// Create a disabled engine. Nothing plays until [`load`](Self::load) succeeds.
    pub fn new(backend: B, config: PlayerConfig, board: StatusBoard) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            backend,
            config,
            board,
            meter: None,
            transport: None,
            track: None,
            state: TransportState::Stopped,
            position: PlaybackPosition::default(),
            segment_scheduled: false,
            generation: 0,
            scrub: ScrubCoordinator::new(),
            progress: ProgressSnapshot::default(),
            meter_level: 0.0,
            end_reason: None,
            events_tx,
            events_rx,
        }
    }

    /// Attach the mailbox the render tap posts meter levels into.
    pub fn with_meter(mut self, meter: Arc<MeterMailbox>) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Receiver for transport events; the worker selects on it.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.events_rx.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.transport.is_some() && self.track.is_some()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn position(&self) -> PlaybackPosition {
        self.position
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrub.is_scrubbing()
    }

    pub fn track(&self) -> Option<&AudioTrack> {
        self.track.as_ref()
    }

    /// Replace the current track and (re)activate the output session for it.
    ///
    /// On failure the engine is left disabled; a later `load` retries activation.
    pub fn load(&mut self, track: AudioTrack) -> Result<(), PlayerError> {
        self.teardown();

        tracing::info!(
            frames = track.length_in_frames(),
            sample_rate = track.sample_rate(),
            channels = track.channels(),
            "loading track"
        );
        let result = match self.backend.activate(&track) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.progress = clock::tick(0, 0, track.length_in_frames(), track.sample_rate())
                    .snapshot;
                self.track = Some(track);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("output session unavailable, player disabled: {e}");
                Err(e)
            }
        };
        self.publish();
        result
    }

    /// Toggle between Playing and Paused/Stopped.
    ///
    /// Entering Playing with nothing scheduled schedules the rest of the buffer
    /// from the current seek frame (the full buffer, looping if configured, from 0).
    pub fn play_or_pause(&mut self) -> Result<(), PlayerError> {
        if !self.is_ready() {
            return Ok(());
        }
        if self.state == TransportState::Playing {
            if let Some(t) = self.transport.as_mut() {
                t.pause();
            }
            self.state = TransportState::Paused;
            self.meter_level = 0.0;
            tracing::info!(frame = self.position.current_frame, "paused");
            self.publish();
            return Ok(());
        }

        if !self.segment_scheduled {
            let length = self.length();
            let start = if self.position.seek_frame >= length {
                0
            } else {
                self.position.seek_frame
            };
            let segment = Segment {
                start_frame: start,
                end_frame: length,
                looping: start == 0 && self.config.loop_playback,
            };
            self.position.seek_frame = start;
            if let Err(e) = self.schedule(segment) {
                return Err(self.fail_operation(e));
            }
        }
        if let Err(e) = self.start_transport() {
            return Err(self.fail_operation(e));
        }
        self.state = TransportState::Playing;
        self.end_reason = None;
        tracing::info!(frame = self.position.seek_frame, "playing");
        self.publish();
        Ok(())
    }

    /// Skip by the configured offset.
    pub fn skip(&mut self, direction: SkipDirection) -> Result<(), PlayerError> {
        self.skip_by(direction, self.config.skip_seconds)
    }

    pub fn skip_by(&mut self, direction: SkipDirection, offset_seconds: f64) -> Result<(), PlayerError> {
        self.seek(direction.request(offset_seconds))
    }

    /// Seek and keep the current transport state (playing keeps playing).
    pub fn seek(&mut self, request: SeekRequest) -> Result<(), PlayerError> {
        if !self.is_ready() {
            return Ok(());
        }
        let current = self.live_frame();
        let target = seek::compute_seek(request, current, self.length(), self.sample_rate());
        let resume = self.state == TransportState::Playing;
        self.seek_to(target, resume)
    }

    /// Enter scrub mode. Audio keeps playing; displayed progress follows the gesture.
    pub fn begin_scrub(&mut self) {
        if !self.is_ready() {
            return;
        }
        let frame = self.live_frame();
        let started = self.scrub.begin_scrub(
            self.state == TransportState::Playing,
            frame,
            self.progress.percent,
        );
        if !started {
            return;
        }
        if self.config.scrub_audition {
            if let Some(t) = self.transport.as_mut() {
                t.set_scrub_target(Some(frame));
            }
        }
        tracing::debug!(frame, "scrub started");
        self.publish();
    }

    /// Record a gesture position. Ignored unless scrubbing.
    pub fn update_scrub(&mut self, percent: f64) {
        let length = self.length();
        let Some(frame) = self.scrub.update_scrub(percent, length) else {
            return;
        };
        if self.config.scrub_audition {
            if let Some(t) = self.transport.as_mut() {
                t.set_scrub_target(Some(frame));
            }
        }
        self.publish();
    }

    /// Leave scrub mode and commit the seek.
    ///
    /// Resumes only if the track was playing when the gesture began (and still is);
    /// otherwise the position moves silently.
    pub fn end_scrub(&mut self) -> Result<(), PlayerError> {
        let Some(release) = self.scrub.end_scrub() else {
            return Ok(());
        };
        if self.config.scrub_audition {
            if let Some(t) = self.transport.as_mut() {
                t.set_scrub_target(None);
            }
        }
        if !self.is_ready() {
            self.publish();
            return Ok(());
        }
        let target = seek::compute_seek(
            release.request,
            self.live_frame(),
            self.length(),
            self.sample_rate(),
        );
        let resume = release.resume && self.state == TransportState::Playing;
        tracing::debug!(target, resume, "scrub released");
        self.seek_to(target, resume)
    }

    /// Periodic display refresh.
    ///
    /// No-op before a track is ready and while the transport is not playing;
    /// never publishes progress percent while scrubbing.
    pub fn on_display_tick(&mut self) {
        let level = self.meter.as_ref().and_then(|m| m.take());
        if !self.is_ready() {
            return;
        }
        if self.state != TransportState::Playing {
            self.meter_level = 0.0;
            self.publish();
            return;
        }
        if let Some(level) = level {
            self.meter_level = level.normalized;
        }

        let render_frame = self
            .transport
            .as_ref()
            .map(|t| t.current_render_frame())
            .unwrap_or(0);
        let reading = clock::tick(
            render_frame,
            self.position.seek_frame,
            self.length(),
            self.sample_rate(),
        );
        self.position.current_frame = reading.current_frame;
        self.progress = reading.snapshot;
        if reading.end_of_track {
            tracing::trace!("render clock at end of track; awaiting completion");
        }
        self.publish();
    }

    /// Apply an event posted by a transport callback.
    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Segment { generation, end } => self.on_segment_event(generation, end),
        }
    }

    /// Apply every pending transport event.
    pub fn pump_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
    }

    /// Segment completion: the authoritative end-of-track path.
    pub fn on_segment_event(&mut self, generation: u64, end: SegmentEnd) {
        if generation != self.generation || !self.segment_scheduled {
            tracing::debug!(generation, current = self.generation, ?end, "stale segment event");
            return;
        }
        self.segment_scheduled = false;
        if end == SegmentEnd::Interrupted {
            return;
        }

        if self.config.loop_playback && self.state == TransportState::Playing {
            tracing::info!("end of track, looping");
            self.position = PlaybackPosition::default();
            let segment = Segment {
                start_frame: 0,
                end_frame: self.length(),
                looping: true,
            };
            let restarted = self.schedule(segment).and_then(|_| self.start_transport());
            if let Err(e) = restarted {
                self.fail_operation(e);
                return;
            }
            self.refresh_progress();
            self.publish();
            return;
        }

        tracing::info!("end of track");
        self.reset_to_start(PlaybackEndReason::Eof);
    }

    /// Drop the transport and forget the track.
    pub fn shutdown(&mut self) {
        self.teardown();
        self.publish();
    }

    fn seek_to(&mut self, target: i64, resume: bool) -> Result<(), PlayerError> {
        self.stop_transport();
        self.position = PlaybackPosition {
            seek_frame: target,
            current_frame: target,
        };

        let segment = match seek::plan_replay(target, self.length()) {
            ReplayPlan::Segment(segment) => segment,
            ReplayPlan::EndOfTrack => {
                tracing::info!(target, "seek reached end of track");
                self.reset_to_start(PlaybackEndReason::Eof);
                return Ok(());
            }
        };

        if let Err(e) = self.schedule(segment) {
            return Err(self.fail_operation(e));
        }
        if resume {
            if let Err(e) = self.start_transport() {
                return Err(self.fail_operation(e));
            }
            self.state = TransportState::Playing;
        } else if self.state == TransportState::Playing {
            self.state = TransportState::Paused;
        }
        if self.state != TransportState::Playing {
            self.meter_level = 0.0;
        }
        tracing::info!(target, resume, "seek");
        self.refresh_progress();
        self.publish();
        Ok(())
    }

    fn schedule(&mut self, segment: Segment) -> Result<(), PlayerError> {
        if self.segment_scheduled {
            self.stop_transport();
        }
        let Some(transport) = self.transport.as_mut() else {
            return Err(PlayerError::Schedule("no output session".to_string()));
        };
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let tx = self.events_tx.clone();
        transport.schedule(
            segment,
            Box::new(move |end| {
                let _ = tx.send(EngineEvent::Segment { generation, end });
            }),
        )?;
        self.segment_scheduled = true;
        tracing::debug!(
            generation,
            start = segment.start_frame,
            end = segment.end_frame,
            looping = segment.looping,
            "segment scheduled"
        );
        Ok(())
    }

    fn start_transport(&mut self) -> Result<(), PlayerError> {
        match self.transport.as_mut() {
            Some(t) => t.start(),
            None => Err(PlayerError::Schedule("no output session".to_string())),
        }
    }

    fn stop_transport(&mut self) {
        if let Some(t) = self.transport.as_mut() {
            t.stop();
        }
        self.segment_scheduled = false;
    }

    /// Stop, rewind to frame 0 and go to Stopped.
    fn reset_to_start(&mut self, reason: PlaybackEndReason) {
        self.stop_transport();
        self.position = PlaybackPosition::default();
        self.state = TransportState::Stopped;
        self.meter_level = 0.0;
        self.end_reason = Some(reason);
        self.refresh_progress();
        self.publish();
    }

    /// Revert to Stopped after a transport failure. The session stays ready.
    fn fail_operation(&mut self, err: PlayerError) -> PlayerError {
        tracing::warn!("transport operation failed: {err}");
        self.stop_transport();
        self.state = TransportState::Stopped;
        self.meter_level = 0.0;
        self.end_reason = Some(PlaybackEndReason::Error);
        self.refresh_progress();
        self.publish();
        err
    }

    fn teardown(&mut self) {
        self.stop_transport();
        self.transport = None;
        self.track = None;
        self.scrub.cancel();
        self.state = TransportState::Stopped;
        self.position = PlaybackPosition::default();
        self.progress = ProgressSnapshot::default();
        self.meter_level = 0.0;
        self.end_reason = None;
    }

    /// Recompute position and progress from the transport's render clock.
    fn refresh_progress(&mut self) {
        let Some(track) = self.track.as_ref() else {
            return;
        };
        let render_frame = self
            .transport
            .as_ref()
            .map(|t| t.current_render_frame())
            .unwrap_or(0);
        let reading = clock::tick(
            render_frame,
            self.position.seek_frame,
            track.length_in_frames(),
            track.sample_rate(),
        );
        self.position.current_frame = reading.current_frame;
        self.progress = reading.snapshot;
    }

    fn live_frame(&mut self) -> i64 {
        self.refresh_progress();
        self.position.current_frame
    }

    fn length(&self) -> i64 {
        self.track.as_ref().map(|t| t.length_in_frames()).unwrap_or(0)
    }

    fn sample_rate(&self) -> f64 {
        self.track.as_ref().map(|t| t.sample_rate()).unwrap_or(1.0)
    }

    fn publish(&self) {
        let progress_percent = match self.scrub.session() {
            Some(session) => session.last_scrub_percent,
            None => self.progress.percent,
        };
        let is_playing = self.state == TransportState::Playing;
        self.board.publish(PlayerStatus {
            is_playing,
            is_player_ready: self.is_ready(),
            transport: self.state,
            progress_percent,
            elapsed_seconds: self.progress.elapsed_seconds,
            remaining_seconds: self.progress.remaining_seconds,
            elapsed_text: self.progress.elapsed_text(),
            remaining_text: self.progress.remaining_text(),
            meter_level: if is_playing { self.meter_level } else { 0.0 },
            is_scrubbing: self.scrub.is_scrubbing(),
            end_reason: self.end_reason,
        });
    }
}
