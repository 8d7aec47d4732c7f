//! Single-track playback controller with sample-accurate seek, scrub and metering.
//!
//! Leaves first: [`track`], [`meter`], [`clock`], [`seek`], [`scrub`]; composed by
//! [`engine`] on top of a [`transport`], driven from [`worker`]. [`output`] is the
//! cpal transport; [`decode`] and [`resample`] prepare tracks for it.

pub mod clock;
pub mod config;
pub mod decode;
pub mod device;
pub mod engine;
pub mod error;
pub mod meter;
pub mod output;
pub mod resample;
pub mod scrub;
pub mod seek;
pub mod status;
pub mod track;
pub mod transport;
pub mod worker;
