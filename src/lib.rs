//! `vsini-fit` library crate.
//!
//! The binary (`vsini`) is a thin wrapper around this library so that:
//!
//! - the fit can be tested against a deterministic engine without spawning processes
//! - the synthesis engine, spectrum store and limb-darkening grid stay swappable
//! - batch drivers other than the CLI can reuse the per-star pipeline

pub mod app;
pub mod cli;
pub mod doppler;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod synth;
