//! Numerical utilities: continuum clipping, interpolation and grid helpers.

pub mod continuum;
pub mod interp;

pub use continuum::*;
pub use interp::*;
