use std::path::PathBuf;
use std::time::Duration;

pub use scrub_player::config::PlayerConfig;

use crate::cli::Args;

#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub path: PathBuf,
    pub device: Option<String>,
    pub json: bool,
    pub player: PlayerConfig,
}

impl PlayConfig {
    pub fn from_args(args: &Args, path: PathBuf) -> Self {
        Self {
            path,
            device: normalize_device_name(args.device.clone()),
            json: args.json,
            player: PlayerConfig {
                tick_interval: Duration::from_millis(args.tick_ms.max(1)),
                skip_seconds: args.skip_seconds,
                loop_playback: args.loop_playback,
                scrub_audition: args.scrub_audition,
                ..PlayerConfig::default()
            },
        }
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn args_map_onto_player_config() {
        let args = Args::try_parse_from([
            "scrub-player",
            "--device",
            "  ",
            "--tick-ms",
            "0",
            "--skip-seconds",
            "5",
            "--scrub-audition",
            "play",
            "a.wav",
        ])
        .unwrap();
        let cfg = PlayConfig::from_args(&args, PathBuf::from("a.wav"));
        assert_eq!(cfg.device, None);
        assert_eq!(cfg.player.tick_interval, Duration::from_millis(1));
        assert_eq!(cfg.player.skip_seconds, 5.0);
        assert!(cfg.player.scrub_audition);
        assert!(!cfg.player.loop_playback);
        assert_eq!(cfg.player.event_capacity, PlayerConfig::default().event_capacity);
    }
}
