//! Player runtime helpers.
//!
//! Provides device enumeration and the interactive local playback session.

use std::io::BufRead;
use std::thread::JoinHandle;

use anyhow::Result;
use crossbeam_channel::Receiver;

use crate::config::PlayConfig;
use crate::console::{self, ConsoleCommand};
use scrub_player::output::CpalBackend;
use scrub_player::seek::{AbsoluteTarget, SeekRequest, SkipDirection};
use scrub_player::worker::{self, EngineHandle};
use scrub_player::{decode, device, resample};
use scrub_player_types::{PlayerStatus, TransportState};

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Decode a local file, bring up the output session and run the console until quit.
pub fn run_play(config: PlayConfig, install_ctrlc: bool) -> Result<()> {
    let (track, info) = decode::load_track(&config.path)?;
    tracing::info!(
        path = ?config.path,
        codec = info.codec.as_deref().unwrap_or("unknown"),
        container = info.container.as_deref().unwrap_or("unknown"),
        channels = track.channels(),
        rate_hz = track.sample_rate(),
        duration_secs = track.duration_seconds(),
        "source (local file)"
    );

    let track_rate = track.sample_rate().round() as u32;
    let output_rate = device::output_rate_for(config.device.as_deref(), track_rate)?;
    if output_rate != track_rate {
        tracing::info!(track_rate, output_rate, "resampling track to output rate");
    }
    let track = resample::conform_track(&track, output_rate)?;

    let backend = CpalBackend::new(config.device.clone(), config.player.clone());
    let meter = backend.meter();
    let handle = worker::spawn_engine(backend, config.player.clone(), Some(meter))?;
    handle.load(track)?;

    let (quit_tx, quit_rx) = crossbeam_channel::bounded::<()>(1);
    if install_ctrlc {
        ctrlc::set_handler(move || {
            let _ = quit_tx.try_send(());
        })?;
    }

    let printer = spawn_status_printer(handle.subscribe(), config.json);
    let lines = spawn_stdin_reader();
    eprintln!("{}", console::HELP);

    loop {
        crossbeam_channel::select! {
            recv(quit_rx) -> _ => break,
            recv(lines) -> line => {
                let Ok(line) = line else { break };
                match console::parse_line(&line) {
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(cmd)) => {
                        if let Err(e) = dispatch(&handle, cmd) {
                            tracing::warn!("console command failed: {e:#}");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{e}; {}", console::HELP),
                }
            }
        }
    }

    handle.shutdown();
    let _ = printer.join();
    Ok(())
}

fn dispatch(handle: &EngineHandle, cmd: ConsoleCommand) -> Result<()> {
    match cmd {
        ConsoleCommand::PlayPause => handle.play_or_pause(),
        ConsoleCommand::Forward => handle.skip(SkipDirection::Forward),
        ConsoleCommand::Back => handle.skip(SkipDirection::Backward),
        ConsoleCommand::Seek(pct) => {
            handle.seek(SeekRequest::Absolute(AbsoluteTarget::Percent(pct)))
        }
        ConsoleCommand::Scrub(pct) => {
            handle.begin_scrub()?;
            handle.update_scrub(pct)
        }
        ConsoleCommand::Release => handle.end_scrub(),
        ConsoleCommand::Help => {
            eprintln!("{}", console::HELP);
            Ok(())
        }
        ConsoleCommand::Quit => Ok(()),
    }
}

/// Forward stdin lines until EOF.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Print status changes until the engine goes away.
fn spawn_status_printer(rx: Receiver<PlayerStatus>, json: bool) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut last: Option<PlayerStatus> = None;
        while let Ok(status) = rx.recv() {
            if !worth_printing(last.as_ref(), &status) {
                continue;
            }
            if json {
                match serde_json::to_string(&status) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!("status encode failed: {e}"),
                }
            } else {
                println!("{}", status_line(&status));
            }
            last = Some(status);
        }
    })
}

/// Display ticks republish every frame; only print when the visible text moves.
fn worth_printing(last: Option<&PlayerStatus>, next: &PlayerStatus) -> bool {
    let Some(last) = last else { return true };
    last.transport != next.transport
        || last.is_player_ready != next.is_player_ready
        || last.is_scrubbing != next.is_scrubbing
        || last.end_reason != next.end_reason
        || last.elapsed_text != next.elapsed_text
        || (next.is_scrubbing && last.progress_percent != next.progress_percent)
}

fn status_line(status: &PlayerStatus) -> String {
    let state = match status.transport {
        TransportState::Stopped => "stopped",
        TransportState::Playing => "playing",
        TransportState::Paused => "paused",
    };
    let mut line = format!(
        "[{state}] {} / -{}  {:5.1}%  level {:.2}",
        status.elapsed_text, status.remaining_text, status.progress_percent, status.meter_level
    );
    if status.is_scrubbing {
        line.push_str("  (scrubbing)");
    }
    if !status.is_player_ready {
        line.push_str("  (output unavailable)");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(elapsed: &str) -> PlayerStatus {
        PlayerStatus {
            is_playing: true,
            is_player_ready: true,
            transport: TransportState::Playing,
            elapsed_text: elapsed.to_string(),
            remaining_text: "00:50".to_string(),
            progress_percent: 16.0,
            meter_level: 0.5,
            ..PlayerStatus::default()
        }
    }

    #[test]
    fn prints_only_visible_changes() {
        let a = playing("00:10");
        let mut b = a.clone();
        b.progress_percent = 16.2;
        assert!(worth_printing(None, &a));
        assert!(!worth_printing(Some(&a), &b));

        b.elapsed_text = "00:11".to_string();
        assert!(worth_printing(Some(&a), &b));
    }

    #[test]
    fn scrub_moves_are_printed() {
        let mut a = playing("00:10");
        a.is_scrubbing = true;
        let mut b = a.clone();
        b.progress_percent = 70.0;
        assert!(worth_printing(Some(&a), &b));
    }

    #[test]
    fn status_line_shows_state_and_times() {
        let line = status_line(&playing("00:10"));
        assert_eq!(line, "[playing] 00:10 / -00:50   16.0%  level 0.50");

        let mut s = playing("00:10");
        s.is_scrubbing = true;
        assert!(status_line(&s).ends_with("(scrubbing)"));
    }
}
