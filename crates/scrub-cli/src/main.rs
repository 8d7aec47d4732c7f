//! `scrub-player`: load one audio file and drive it from the console.
//!
//! The track is decoded up front, conformed to the output device rate, and played
//! through the sample-accurate transport in the `scrub-player` crate. Status lines
//! (or JSON with `--json`) are printed as playback, seeks and scrubs change it.

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use scrub_cli::{cli, config, runtime};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,scrub_player=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    match &args.cmd {
        Some(cli::Command::Play { path }) => {
            let config = config::PlayConfig::from_args(&args, path.clone());
            runtime::run_play(config, true)
        }
        None => Err(anyhow!("nothing to do; try `scrub-player play <path>` or --help")),
    }
}
