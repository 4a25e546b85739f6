//! The capability seam between the pack stepper and per-cell state.

use crate::error::{CellError, CellResult};

/// Well-known output variable names.
pub mod variables {
    pub const TERMINAL_VOLTAGE: &str = "Terminal voltage [V]";
    pub const OPEN_CIRCUIT_VOLTAGE: &str = "Surface open-circuit voltage [V]";
    pub const STATE_OF_CHARGE: &str = "State of charge";
    pub const OVERPOTENTIAL: &str = "RC overpotential [V]";
    pub const DISCHARGE_CAPACITY: &str = "Discharge capacity [A.h]";
}

/// Shared, immutable description of a cell type.
///
/// One model is shared by every worker; each worker asks it to build the
/// integrators for the cells it owns.
pub trait CellModel: Send + Sync {
    /// Every variable `CellIntegrator::evaluate` returns, in order.
    fn variable_names(&self) -> Vec<String>;

    /// Every event signal `CellIntegrator::events` returns, in order.
    fn event_names(&self) -> Vec<String>;

    /// Lower and upper terminal voltage cut-offs (V).
    fn voltage_limits(&self) -> (f64, f64);

    /// Named per-cell parameters that `CellIntegrator::set_input` accepts.
    fn input_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Build the integrator for global cell `cell` at the given state of charge.
    fn build(&self, cell: usize, initial_soc: f64) -> CellResult<Box<dyn CellIntegrator>>;
}

/// Opaque stateful stepper for one cell.
///
/// Currents are in amps, discharge positive.
pub trait CellIntegrator: Send {
    /// Advance the internal state by `dt` seconds at constant `current`.
    fn advance(&mut self, current: f64, dt: f64) -> CellResult<()>;

    /// Evaluate every model variable at the present state, without advancing.
    fn evaluate(&self, current: f64) -> Vec<f64>;

    /// Event signals at the present state; a sign change marks an event.
    fn events(&self, current: f64) -> Vec<f64>;

    /// Override a named parameter. The value holds until set again.
    fn set_input(&mut self, name: &str, _value: f64) -> CellResult<()> {
        Err(CellError::UnknownInput { name: name.into() })
    }
}
