//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - spectra and their calibration headers (`Spectrum`, `SpectrumHeader`)
//! - the iron-line window table (`Interval`)
//! - stellar inputs and perturbations (`StellarParameters`, `Perturbation`)
//! - fit outputs (`TrialResult`, `FitStatus`, `StarEstimate`)
//! - run configuration (`EngineConfig`, `PipelineConfig`)

pub mod types;

pub use types::*;
