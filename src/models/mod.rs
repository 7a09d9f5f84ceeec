//! Empirical stellar relations used alongside the fit.
//!
//! Kept as small, pure functions so that fitting code can stay generic.

pub mod model;

pub use model::*;
