//! The stateful shard that owns and advances a range of cells.

use std::ops::Range;
use std::sync::Arc;

use pf_cell::{CellError, CellIntegrator, CellModel, CellResult, variables};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::events::EventTracker;
use crate::inputs::CellInputs;

/// Starting state of charge for every cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InitialSoc {
    Uniform(f64),
    /// One value per global cell.
    PerCell(Vec<f64>),
}

impl Default for InitialSoc {
    fn default() -> Self {
        InitialSoc::Uniform(1.0)
    }
}

impl InitialSoc {
    pub fn validate(&self, n_cells: usize) -> SimResult<()> {
        match self {
            InitialSoc::Uniform(_) => Ok(()),
            InitialSoc::PerCell(socs) => Ok(pf_core::error::ensure_len(
                "initial state of charge",
                n_cells,
                socs.len(),
            )?),
        }
    }

    pub fn for_cell(&self, cell: usize) -> SimResult<f64> {
        match self {
            InitialSoc::Uniform(soc) => Ok(*soc),
            InitialSoc::PerCell(socs) => {
                socs.get(cell)
                    .copied()
                    .ok_or(SimError::Core(pf_core::PfError::IndexOob {
                        what: "initial state of charge",
                        index: cell,
                        len: socs.len(),
                    }))
            }
        }
    }
}

/// Terminal voltage and OCV first, then `extra` in order without duplicates.
pub fn output_variable_names<S: AsRef<str>>(extra: &[S]) -> Vec<String> {
    let mut names = vec![
        variables::TERMINAL_VOLTAGE.to_string(),
        variables::OPEN_CIRCUIT_VOLTAGE.to_string(),
    ];
    for name in extra {
        let name = name.as_ref();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Everything a worker needs to build its cells.
#[derive(Clone)]
pub struct WorkerSetup {
    pub model: Arc<dyn CellModel>,
    pub dt: f64,
    pub variables: Vec<String>,
    pub initial_soc: InitialSoc,
    /// Parameter values applied to each cell once it is built
    pub inputs: CellInputs,
}

impl WorkerSetup {
    pub fn new(model: Arc<dyn CellModel>, dt: f64, extra_variables: &[&str]) -> Self {
        Self {
            model,
            dt,
            variables: output_variable_names(extra_variables),
            initial_soc: InitialSoc::default(),
            inputs: CellInputs::default(),
        }
    }

    pub fn with_initial_soc(mut self, initial_soc: InitialSoc) -> Self {
        self.initial_soc = initial_soc;
        self
    }

    pub fn with_inputs(mut self, inputs: CellInputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub(crate) fn validate(&self, n_cells: usize) -> SimResult<()> {
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(SimError::Setup {
                what: format!("time increment must be positive, got {}", self.dt),
            });
        }
        self.initial_soc.validate(n_cells)?;
        self.inputs.validate(n_cells, &self.model.input_names())
    }
}

/// How a shard advances its cells.
pub enum Executor {
    Serial,
    /// Cells are advanced in parallel on a dedicated rayon pool.
    Rayon(rayon::ThreadPool),
}

/// Owns the integrators for one contiguous range of cells.
pub struct ShardWorker {
    range: Range<usize>,
    dt: f64,
    cells: Vec<Box<dyn CellIntegrator>>,
    /// Index into the model's variable list for each output variable
    selected: Vec<usize>,
    event_names: Vec<String>,
    /// Latest outputs, `[var][local cell]`
    output: Vec<Vec<f64>>,
    tracker: EventTracker,
    executor: Executor,
}

struct CellSample {
    values: Vec<f64>,
    events: Option<Vec<f64>>,
}

impl ShardWorker {
    pub fn new(range: Range<usize>, setup: &WorkerSetup, executor: Executor) -> SimResult<Self> {
        let model_vars = setup.model.variable_names();
        let selected = setup
            .variables
            .iter()
            .map(|name| {
                model_vars
                    .iter()
                    .position(|v| v == name)
                    .ok_or_else(|| CellError::UnknownVariable { name: name.clone() })
            })
            .collect::<CellResult<Vec<_>>>()?;

        let mut cells = Vec::with_capacity(range.len());
        for cell in range.clone() {
            let soc = setup.initial_soc.for_cell(cell)?;
            cells.push(setup.model.build(cell, soc)?);
        }

        let event_names = setup.model.event_names();
        let n = range.len();
        let mut worker = Self {
            dt: setup.dt,
            selected,
            output: vec![vec![0.0; n]; setup.variables.len()],
            tracker: EventTracker::new(event_names.len(), n),
            event_names,
            cells,
            range,
            executor,
        };
        let local = setup.inputs.slice(worker.range())?;
        worker.update_inputs(&local)?;
        Ok(worker)
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn event_names(&self) -> &[String] {
        &self.event_names
    }

    /// Advance every cell by `dt` at its input current, refresh the outputs
    /// and report whether any event signal changed sign.
    pub fn step(&mut self, inputs: &[f64]) -> SimResult<bool> {
        let dt = self.dt;
        let samples = self.for_each_cell(inputs, |cell, current| {
            cell.advance(current, dt)?;
            Ok(CellSample {
                values: cell.evaluate(current),
                events: Some(cell.events(current)),
            })
        })?;
        let n = samples.len();
        let mut signals = vec![0.0; self.event_names.len() * n];
        for (c, sample) in samples.iter().enumerate() {
            if let Some(events) = &sample.events {
                for (e, &value) in events.iter().enumerate().take(self.event_names.len()) {
                    signals[e * n + c] = value;
                }
            }
        }
        self.store_output(&samples);
        Ok(self.tracker.observe(signals))
    }

    /// Refresh the outputs at the present state without advancing time.
    pub fn evaluate(&mut self, inputs: &[f64]) -> SimResult<()> {
        let samples = self.for_each_cell(inputs, |cell, current| {
            Ok(CellSample {
                values: cell.evaluate(current),
                events: None,
            })
        })?;
        self.store_output(&samples);
        Ok(())
    }

    /// Set named parameters on the owned cells; `inputs` is indexed by
    /// local cell.
    pub fn update_inputs(&mut self, inputs: &CellInputs) -> SimResult<()> {
        for (name, values) in inputs.iter() {
            pf_core::error::ensure_len("shard input values", self.cells.len(), values.len())?;
            for (cell, &value) in self.cells.iter_mut().zip(values) {
                cell.set_input(name, value)?;
            }
        }
        Ok(())
    }

    /// Latest outputs, `[var][local cell]`.
    pub fn output(&self) -> &[Vec<f64>] {
        &self.output
    }

    /// Sign-change flags from the latest step, `[event][local cell]`.
    pub fn event_change(&self) -> Vec<Vec<bool>> {
        self.tracker.changes()
    }

    fn for_each_cell<F>(&mut self, inputs: &[f64], f: F) -> SimResult<Vec<CellSample>>
    where
        F: Fn(&mut Box<dyn CellIntegrator>, f64) -> CellResult<CellSample> + Sync,
    {
        pf_core::error::ensure_len("shard inputs", self.cells.len(), inputs.len())?;
        let cells = &mut self.cells;
        let samples = match &self.executor {
            Executor::Serial => cells
                .iter_mut()
                .zip(inputs)
                .map(|(cell, &current)| f(cell, current))
                .collect::<CellResult<Vec<_>>>(),
            Executor::Rayon(pool) => pool.install(|| {
                cells
                    .par_iter_mut()
                    .zip(inputs.par_iter())
                    .map(|(cell, &current)| f(cell, current))
                    .collect::<CellResult<Vec<_>>>()
            }),
        };
        Ok(samples?)
    }

    fn store_output(&mut self, samples: &[CellSample]) {
        for (row, &var) in self.output.iter_mut().zip(&self.selected) {
            for (slot, sample) in row.iter_mut().zip(samples) {
                *slot = sample.values.get(var).copied().unwrap_or(f64::NAN);
            }
        }
    }
}
