//! Input/output helpers.
//!
//! - spectrum store (`spectrum`)
//! - catalog + interval table ingest (`ingest`)
//! - limb-darkening grid (`limb`)
//! - result exports (JSON) (`export`)

pub mod export;
pub mod ingest;
pub mod limb;
pub mod spectrum;

pub use export::*;
pub use ingest::*;
pub use limb::*;
pub use spectrum::*;
