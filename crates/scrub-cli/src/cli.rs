use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "scrub-player", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Display refresh interval in milliseconds
    #[arg(long, default_value_t = 16)]
    pub tick_ms: u64,

    /// Seconds moved by the `f` / `b` console commands
    #[arg(long, default_value_t = 10.0)]
    pub skip_seconds: f64,

    /// Restart from the top when the track finishes
    #[arg(long = "loop")]
    pub loop_playback: bool,

    /// Sweep audio toward the scrub position while scrubbing instead of playing on
    #[arg(long)]
    pub scrub_audition: bool,

    /// Print status changes as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a local file and control it from the console
    Play {
        /// Path to audio file
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_flags() {
        let args = Args::try_parse_from([
            "scrub-player",
            "--device",
            "usb",
            "--loop",
            "--tick-ms",
            "33",
            "play",
            "song.flac",
        ])
        .unwrap();
        assert_eq!(args.device.as_deref(), Some("usb"));
        assert!(args.loop_playback);
        assert_eq!(args.tick_ms, 33);
        assert!(matches!(args.cmd, Some(Command::Play { ref path }) if path == &PathBuf::from("song.flac")));
    }

    #[test]
    fn list_devices_needs_no_subcommand() {
        let args = Args::try_parse_from(["scrub-player", "--list-devices"]).unwrap();
        assert!(args.list_devices);
        assert!(args.cmd.is_none());
        assert_eq!(args.skip_seconds, 10.0);
    }
}
