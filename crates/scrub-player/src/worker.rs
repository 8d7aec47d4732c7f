//! Engine worker thread.
//!
//! The engine lives on one thread that serializes user commands, transport
//! events and the display tick. Callers talk to it through an [`EngineHandle`]
//! and observe it through the [`StatusReader`] the handle carries.

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender};

use crate::config::PlayerConfig;
use crate::engine::PlaybackEngine;
use crate::error::PlayerError;
use crate::meter::MeterMailbox;
use crate::seek::{SeekRequest, SkipDirection};
use crate::status::{PlayerStatus, StatusBoard, StatusReader};
use crate::track::AudioTrack;
use crate::transport::AudioBackend;

/// Commands accepted by the engine worker.
#[derive(Debug)]
pub enum EngineCommand {
    Load {
        track: AudioTrack,
        reply: Sender<Result<(), PlayerError>>,
    },
    PlayOrPause,
    Skip(SkipDirection),
    Seek(SeekRequest),
    BeginScrub,
    UpdateScrub(f64),
    EndScrub,
    Shutdown,
}

/// Handle for driving the engine worker.
pub struct EngineHandle {
    cmd_tx: Sender<EngineCommand>,
    status: StatusReader,
    join: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Load a track and wait for the output session to come up.
    pub fn load(&self, track: AudioTrack) -> Result<(), PlayerError> {
        let (reply, reply_rx) = crossbeam_channel::bounded(1);
        self.send(EngineCommand::Load { track, reply })
            .map_err(PlayerError::activation)?;
        reply_rx
            .recv()
            .map_err(|_| PlayerError::SessionActivation("engine worker exited".into()))?
    }

    pub fn play_or_pause(&self) -> Result<()> {
        self.send(EngineCommand::PlayOrPause)
    }

    pub fn skip(&self, direction: SkipDirection) -> Result<()> {
        self.send(EngineCommand::Skip(direction))
    }

    pub fn seek(&self, request: SeekRequest) -> Result<()> {
        self.send(EngineCommand::Seek(request))
    }

    pub fn begin_scrub(&self) -> Result<()> {
        self.send(EngineCommand::BeginScrub)
    }

    pub fn update_scrub(&self, percent: f64) -> Result<()> {
        self.send(EngineCommand::UpdateScrub(percent))
    }

    pub fn end_scrub(&self) -> Result<()> {
        self.send(EngineCommand::EndScrub)
    }

    /// Latest published state.
    pub fn status(&self) -> PlayerStatus {
        self.status.snapshot()
    }

    /// Change-only stream of published state, starting with the current one.
    pub fn subscribe(&self) -> Receiver<PlayerStatus> {
        self.status.subscribe()
    }

    /// Stop the worker and wait for it to release the output session.
    pub fn shutdown(mut self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow!("engine worker is not running"))
    }
}

/// Spawn the engine worker thread.
///
/// The backend is moved onto the worker, which owns every transport it
/// activates; only the backend itself has to be `Send`.
pub fn spawn_engine<B>(
    backend: B,
    config: PlayerConfig,
    meter: Option<Arc<MeterMailbox>>,
) -> Result<EngineHandle>
where
    B: AudioBackend + 'static,
{
    let (board, status) = StatusBoard::new();
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let join = std::thread::Builder::new()
        .name("scrub-engine".into())
        .spawn(move || {
            let mut engine = PlaybackEngine::new(backend, config.clone(), board);
            if let Some(meter) = meter {
                engine = engine.with_meter(meter);
            }
            engine_thread_main(engine, &config, cmd_rx);
        })?;

    Ok(EngineHandle {
        cmd_tx,
        status,
        join: Some(join),
    })
}

/// Main loop for the engine worker.
fn engine_thread_main<B: AudioBackend>(
    mut engine: PlaybackEngine<B>,
    config: &PlayerConfig,
    cmd_rx: Receiver<EngineCommand>,
) {
    let events = engine.events();
    let ticker = crossbeam_channel::tick(config.tick_interval);

    loop {
        crossbeam_channel::select! {
            recv(cmd_rx) -> cmd => {
                let Ok(cmd) = cmd else { break };
                if !apply_command(&mut engine, cmd) {
                    break;
                }
            }
            recv(events) -> event => {
                if let Ok(event) = event {
                    engine.handle_event(event);
                }
            }
            recv(ticker) -> _ => engine.on_display_tick(),
        }
    }

    engine.shutdown();
    tracing::debug!("engine worker stopped");
}

/// Returns `false` when the worker should exit.
fn apply_command<B: AudioBackend>(engine: &mut PlaybackEngine<B>, cmd: EngineCommand) -> bool {
    let result = match cmd {
        EngineCommand::Load { track, reply } => {
            let _ = reply.send(engine.load(track));
            Ok(())
        }
        EngineCommand::PlayOrPause => engine.play_or_pause(),
        EngineCommand::Skip(direction) => engine.skip(direction),
        EngineCommand::Seek(request) => engine.seek(request),
        EngineCommand::BeginScrub => {
            engine.begin_scrub();
            Ok(())
        }
        EngineCommand::UpdateScrub(percent) => {
            engine.update_scrub(percent);
            Ok(())
        }
        EngineCommand::EndScrub => engine.end_scrub(),
        EngineCommand::Shutdown => return false,
    };
    if let Err(e) = result {
        tracing::warn!("command failed: {e}");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlayerError;
    use crate::seek::Segment;
    use crate::status::TransportState;
    use crate::transport::{SegmentCallback, SegmentEnd, Transport};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Shared {
        pending: Option<SegmentCallback>,
        render_frame: i64,
        fail_activation: bool,
    }

    struct TestTransport {
        shared: Arc<Mutex<Shared>>,
    }

    impl Transport for TestTransport {
        fn schedule(
            &mut self,
            _segment: Segment,
            on_complete: SegmentCallback,
        ) -> Result<(), PlayerError> {
            self.shared.lock().unwrap().pending = Some(on_complete);
            Ok(())
        }

        fn start(&mut self) -> Result<(), PlayerError> {
            Ok(())
        }

        fn pause(&mut self) {}

        fn stop(&mut self) {
            let pending = self.shared.lock().unwrap().pending.take();
            if let Some(cb) = pending {
                cb(SegmentEnd::Interrupted);
            }
        }

        fn current_render_frame(&self) -> i64 {
            self.shared.lock().unwrap().render_frame
        }
    }

    struct TestBackend {
        shared: Arc<Mutex<Shared>>,
    }

    impl AudioBackend for TestBackend {
        type Transport = TestTransport;

        fn activate(&mut self, _track: &AudioTrack) -> Result<TestTransport, PlayerError> {
            if self.shared.lock().unwrap().fail_activation {
                return Err(PlayerError::SessionActivation("no device".into()));
            }
            Ok(TestTransport {
                shared: self.shared.clone(),
            })
        }
    }

    fn track() -> AudioTrack {
        AudioTrack::from_interleaved(vec![0.25; 1_000], 1, 100.0).unwrap()
    }

    fn fast_config() -> PlayerConfig {
        PlayerConfig {
            tick_interval: Duration::from_millis(2),
            ..PlayerConfig::default()
        }
    }

    fn wait_for(rx: &Receiver<PlayerStatus>, pred: impl Fn(&PlayerStatus) -> bool) -> PlayerStatus {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let status = rx.recv_timeout(remaining).expect("status before deadline");
            if pred(&status) {
                return status;
            }
        }
    }

    #[test]
    fn load_play_and_tick_publish_progress() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let handle = spawn_engine(
            TestBackend {
                shared: shared.clone(),
            },
            fast_config(),
            None,
        )
        .unwrap();
        let rx = handle.subscribe();

        handle.load(track()).unwrap();
        handle.play_or_pause().unwrap();
        wait_for(&rx, |s| s.transport == TransportState::Playing);

        shared.lock().unwrap().render_frame = 500;
        let status = wait_for(&rx, |s| s.progress_percent >= 50.0);
        assert!(status.is_playing);
        assert!((status.elapsed_seconds - 5.0).abs() < 1e-9);

        handle.shutdown();
    }

    #[test]
    fn segment_completion_resets_to_start() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let handle = spawn_engine(
            TestBackend {
                shared: shared.clone(),
            },
            fast_config(),
            None,
        )
        .unwrap();
        let rx = handle.subscribe();

        handle.load(track()).unwrap();
        handle.play_or_pause().unwrap();
        wait_for(&rx, |s| s.is_playing);

        let cb = shared.lock().unwrap().pending.take().unwrap();
        cb(SegmentEnd::Finished);

        let status = wait_for(&rx, |s| s.transport == TransportState::Stopped);
        assert_eq!(status.progress_percent, 0.0);
        assert_eq!(status.meter_level, 0.0);

        handle.shutdown();
    }

    #[test]
    fn failed_activation_is_reported_to_the_caller() {
        let shared = Arc::new(Mutex::new(Shared {
            fail_activation: true,
            ..Shared::default()
        }));
        let handle = spawn_engine(TestBackend { shared }, fast_config(), None).unwrap();

        let err = handle.load(track()).unwrap_err();
        assert!(matches!(err, PlayerError::SessionActivation(_)));
        assert!(!handle.status().is_player_ready);

        handle.play_or_pause().unwrap();
        handle.shutdown();
    }

    #[test]
    fn commands_after_shutdown_fail() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let handle = spawn_engine(TestBackend { shared }, fast_config(), None).unwrap();
        let cmd_tx = handle.cmd_tx.clone();
        handle.shutdown();
        assert!(cmd_tx.send(EngineCommand::PlayOrPause).is_err());
    }
}
