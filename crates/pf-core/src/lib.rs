//! pf-core: shared foundation for packflow.
//!
//! Contains:
//! - units (uom SI electrical types + constructors)
//! - numeric (Real + tolerances + float helpers)
//! - ids (compact IDs for circuit nodes and branches)
//! - error (shared error types)
//! - timing (span timers for the stepping loop)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;
pub mod units;

pub use error::{PfError, PfResult, ensure_len};
pub use ids::*;
pub use numeric::*;
pub use units::*;
