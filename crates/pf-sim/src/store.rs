//! Dense per-step result arrays owned by the orchestrator.

use pf_circuit::CircuitSolution;
use serde::{Deserialize, Serialize};

use crate::pool::OutputBlock;
use crate::termination::TerminationReport;

/// Results of a pack run, truncated to the completed steps.
///
/// Per-cell arrays are `[step][cell]`; node voltages are `[step][node]` with
/// ground first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackOutput {
    /// Time label of each step (s)
    pub times: Vec<f64>,
    pub pack_current: Vec<f64>,
    pub pack_voltage: Vec<f64>,
    pub pack_power: Vec<f64>,
    /// Applied cell current, discharge positive (A)
    pub cell_current: Vec<Vec<f64>>,
    pub internal_resistance: Vec<Vec<f64>>,
    pub node_voltages: Vec<Vec<f64>>,
    /// Worker outputs by name, each `[step][cell]`
    pub variables: Vec<(String, Vec<Vec<f64>>)>,
    pub terminations: Vec<TerminationReport>,
    pub steps_completed: usize,
}

impl PackOutput {
    pub fn variable(&self, name: &str) -> Option<&[Vec<f64>]> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(n, _)| n.as_str())
    }

    pub fn n_cells(&self) -> usize {
        self.cell_current.first().map_or(0, Vec::len)
    }

    pub fn terminated_early(&self) -> bool {
        !self.terminations.is_empty()
    }
}

/// Preallocated storage for `n_steps` steps.
pub struct OutputStore {
    n_steps: usize,
    times: Vec<f64>,
    pack_current: Vec<f64>,
    pack_voltage: Vec<f64>,
    pack_power: Vec<f64>,
    cell_current: Vec<Vec<f64>>,
    internal_resistance: Vec<Vec<f64>>,
    node_voltages: Vec<Vec<f64>>,
    variable_names: Vec<String>,
    /// `[var][step][cell]`
    variables: Vec<Vec<Vec<f64>>>,
}

impl OutputStore {
    pub fn new(n_steps: usize, n_cells: usize, n_nodes: usize, variable_names: Vec<String>) -> Self {
        let per_cell = || vec![vec![0.0; n_cells]; n_steps];
        Self {
            n_steps,
            times: vec![0.0; n_steps],
            pack_current: vec![0.0; n_steps],
            pack_voltage: vec![0.0; n_steps],
            pack_power: vec![0.0; n_steps],
            cell_current: per_cell(),
            internal_resistance: per_cell(),
            node_voltages: vec![vec![0.0; n_nodes]; n_steps],
            variables: (0..variable_names.len()).map(|_| per_cell()).collect(),
            variable_names,
        }
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Seed a step's cell current and node voltages ahead of its own record.
    pub fn seed(&mut self, step: usize, cell_current: &[f64], node_voltages: &[f64]) {
        if step < self.n_steps {
            self.cell_current[step].copy_from_slice(cell_current);
            self.node_voltages[step].copy_from_slice(node_voltages);
        }
    }

    pub fn cell_current(&self, step: usize) -> &[f64] {
        &self.cell_current[step]
    }

    pub fn record_variables(&mut self, step: usize, block: &OutputBlock) {
        for (var, rows) in self.variables.iter_mut().enumerate() {
            rows[step].copy_from_slice(block.variable(var));
        }
    }

    pub fn record_resistance(&mut self, step: usize, resistance: &[f64]) {
        self.internal_resistance[step].copy_from_slice(resistance);
    }

    /// Record the circuit result for `step` and seed the next step's current.
    pub fn record_solution(
        &mut self,
        step: usize,
        time: f64,
        cell_current: &[f64],
        solution: &CircuitSolution,
    ) {
        self.times[step] = time;
        self.pack_current[step] = solution.terminal_current;
        self.pack_voltage[step] = solution.terminal_voltage;
        self.pack_power[step] = solution.terminal_power;
        self.cell_current[step].copy_from_slice(cell_current);
        self.node_voltages[step].copy_from_slice(&solution.node_voltages);
        if step + 1 < self.n_steps {
            self.cell_current[step + 1].copy_from_slice(cell_current);
        }
    }

    /// Truncate every array to the first `completed` steps.
    pub fn finish(self, completed: usize, terminations: Vec<TerminationReport>) -> PackOutput {
        let n = completed.min(self.n_steps);
        let cut = |mut v: Vec<Vec<f64>>| {
            v.truncate(n);
            v
        };
        let cut1 = |mut v: Vec<f64>| {
            v.truncate(n);
            v
        };
        PackOutput {
            times: cut1(self.times),
            pack_current: cut1(self.pack_current),
            pack_voltage: cut1(self.pack_voltage),
            pack_power: cut1(self.pack_power),
            cell_current: cut(self.cell_current),
            internal_resistance: cut(self.internal_resistance),
            node_voltages: cut(self.node_voltages),
            variables: self
                .variable_names
                .into_iter()
                .zip(self.variables.into_iter().map(cut))
                .collect(),
            terminations,
            steps_completed: n,
        }
    }
}
