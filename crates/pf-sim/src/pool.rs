//! The worker-pool seam the orchestrator drives.

use crate::error::SimResult;
use crate::inputs::CellInputs;

/// Gathered worker outputs, `[var][global cell]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBlock {
    values: Vec<Vec<f64>>,
}

impl OutputBlock {
    pub fn new(n_vars: usize, n_cells: usize) -> Self {
        Self {
            values: vec![vec![0.0; n_cells]; n_vars],
        }
    }

    pub fn n_vars(&self) -> usize {
        self.values.len()
    }

    pub fn variable(&self, index: usize) -> &[f64] {
        &self.values[index]
    }

    pub(crate) fn variable_mut(&mut self, index: usize) -> &mut [f64] {
        &mut self.values[index]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.values
    }
}

/// A set of shards that together own every cell of the pack.
///
/// Every dispatch is a concurrent fan-out followed by a barrier: it returns
/// only once each shard has finished.
pub trait WorkerPool {
    fn n_cells(&self) -> usize;

    /// Output variable names, in `OutputBlock` row order.
    fn variable_names(&self) -> &[String];

    fn event_names(&self) -> &[String];

    /// Advance every cell by one time increment. Returns true when any shard
    /// saw an event signal change sign.
    fn step(&mut self, currents: &[f64]) -> SimResult<bool>;

    /// Refresh outputs at the present state without advancing.
    fn evaluate(&mut self, currents: &[f64]) -> SimResult<()>;

    /// Override named cell parameters, `inputs` indexed by global cell. Takes
    /// effect from the next step.
    fn update_inputs(&mut self, inputs: &CellInputs) -> SimResult<()>;

    fn collect_output(&mut self) -> SimResult<OutputBlock>;

    /// Event flags from the latest step, `[event][global cell]`.
    fn event_changes(&mut self) -> SimResult<Vec<Vec<bool>>>;

    fn shutdown(&mut self) -> SimResult<()>;
}
