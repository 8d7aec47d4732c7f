//! Line-oriented console commands.
//!
//! - `p`: play/pause
//! - `f` / `b`: skip forward/back
//! - `seek <pct>`: jump to a percentage
//! - `scrub <pct>`: drag the progress position (starts a scrub if needed)
//! - `release`: end the scrub gesture
//! - `q`: quit

use anyhow::{Result, anyhow};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConsoleCommand {
    PlayPause,
    Forward,
    Back,
    Seek(f64),
    Scrub(f64),
    Release,
    Help,
    Quit,
}

pub const HELP: &str =
    "commands: p (play/pause), f/b (skip), seek <pct>, scrub <pct>, release, q (quit)";

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(None);
    };
    let cmd = match word.to_ascii_lowercase().as_str() {
        "p" | "play" | "pause" => ConsoleCommand::PlayPause,
        "f" | "fwd" => ConsoleCommand::Forward,
        "b" | "back" => ConsoleCommand::Back,
        "seek" => ConsoleCommand::Seek(percent_arg(parts.next())?),
        "scrub" => ConsoleCommand::Scrub(percent_arg(parts.next())?),
        "release" | "r" => ConsoleCommand::Release,
        "h" | "help" | "?" => ConsoleCommand::Help,
        "q" | "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(anyhow!("unknown command: {other}")),
    };
    Ok(Some(cmd))
}

fn percent_arg(arg: Option<&str>) -> Result<f64> {
    let raw = arg.ok_or_else(|| anyhow!("missing percentage"))?;
    let value: f64 = raw
        .trim_end_matches('%')
        .parse()
        .map_err(|_| anyhow!("not a percentage: {raw}"))?;
    if !value.is_finite() {
        return Err(anyhow!("not a percentage: {raw}"));
    }
    Ok(value)
}
