//! Rotational-velocity fitting.
//!
//! Responsibilities:
//!
//! - resample and continuum-normalize the observed line regions
//! - turn a trial vrot into a residual vector through the synthesis engine
//! - minimize it with a bounded Levenberg–Marquardt iteration
//! - repeat the fit over the five parameter perturbations and combine errors

pub mod lm;
pub mod observed;
pub mod propagation;
pub mod residuals;

pub use lm::*;
pub use observed::*;
pub use propagation::*;
pub use residuals::*;
