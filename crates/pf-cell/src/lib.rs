//! Per-cell electrochemical stepping for packflow.
//!
//! Provides:
//! - `CellModel` / `CellIntegrator`: the capability seam the pack stepper drives
//! - Fixed-step RK4 and forward Euler integrators over a `TransientModel`
//! - A first-order equivalent-circuit reference cell (`EcmModel`)

pub mod cell;
pub mod ecm;
pub mod error;
pub mod integrator;
pub mod model;

pub use cell::{CellIntegrator, CellModel, variables};
pub use ecm::{EcmCell, EcmModel, EcmParams, OcvCurve};
pub use error::{CellError, CellResult};
pub use integrator::{ForwardEuler, Integrator, IntegratorType, RK4};
pub use model::TransientModel;
