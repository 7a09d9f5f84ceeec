use std::path::PathBuf;

use thiserror::Error;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failures raised by the spectral pipeline.
///
/// Synthesis and alignment failures abort the current star; the batch driver
/// catches them at the per-star boundary.
#[derive(Error, Debug)]
pub enum VsiniError {
    /// Missing or malformed wavelength calibration.
    #[error("Failed to load spectrum '{path}': {reason}")]
    SpectrumLoad { path: PathBuf, reason: String },

    /// The observed spectrum does not cover the requested wavelength grid.
    #[error("Observed spectrum covers [{min:.3}, {max:.3}] but {wavelength:.3} was requested")]
    Coverage { wavelength: f64, min: f64, max: f64 },

    #[error("No usable continuum in normalization window [{start:.3}, {end:.3}]")]
    Continuum { start: f64, end: f64 },

    /// Observed and synthetic line-region series differ in length.
    #[error("Observed series has {observed} points but synthetic selection has {synthetic}")]
    Alignment { observed: usize, synthetic: usize },

    #[error("Synthesis I/O failure: {0}")]
    SynthesisIo(String),

    #[error("Cannot parse synthesis output line {line}: '{content}'")]
    SynthesisParse { line: usize, content: String },

    #[error("Synthesis engine did not finish within {seconds} s")]
    SynthesisTimeout { seconds: u64 },

    #[error("Limb-darkening query {axis}={value} outside tabulated range [{min}, {max}]")]
    LimbDarkeningRange {
        axis: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Optimizer stopped with a fatal status (0, -16 or a caller-requested stop).
    #[error("Optimizer failed with status {status}: {message}")]
    OptimizerFatal { status: i32, message: String },

    /// Raised by an objective to ask the optimizer to stop (code in -15..=-1).
    #[error("Objective requested termination (code {code})")]
    EarlyTermination { code: i32 },

    #[error("Invalid catalog input: {0}")]
    Catalog(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VsiniError {
    /// Process exit code used when this error reaches the binary boundary.
    pub fn exit_code(&self) -> u8 {
        match self {
            VsiniError::SpectrumLoad { .. } | VsiniError::Catalog(_) | VsiniError::Io(_) => 2,
            VsiniError::Coverage { .. } | VsiniError::Continuum { .. } | VsiniError::LimbDarkeningRange { .. } => 3,
            _ => 4,
        }
    }
}

impl From<VsiniError> for AppError {
    fn from(err: VsiniError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}
