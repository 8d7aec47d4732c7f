//! Typed errors surfaced by the player library.

use thiserror::Error;

/// Errors returned by track loading, output activation and scheduling.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The track could not be decoded into a usable sample buffer.
    #[error("decode error: {0}")]
    Decode(String),

    /// The output session (device + stream) could not be activated.
    #[error("audio session activation failed: {0}")]
    SessionActivation(String),

    /// The transport refused to schedule a segment.
    #[error("failed to schedule segment: {0}")]
    Schedule(String),
}

impl PlayerError {
    /// Wrap an `anyhow` chain as a session activation failure.
    pub fn activation(err: anyhow::Error) -> Self {
        Self::SessionActivation(format!("{err:#}"))
    }

    /// Wrap an `anyhow` chain as a decode failure.
    pub fn decode(err: anyhow::Error) -> Self {
        Self::Decode(format!("{err:#}"))
    }
}
