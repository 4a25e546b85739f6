//! One-call entry point: build a pool, run the orchestrator, shut down.

use std::sync::Arc;

use pf_cell::CellModel;
use pf_circuit::{MnaSolver, Netlist, NewtonConfig};
use pf_protocol::Protocol;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::distributed::DistributedPool;
use crate::error::SimResult;
use crate::inputs::CellInputs;
use crate::orchestrator::{InputOverride, Orchestrator};
use crate::partition::Partition;
use crate::pool::WorkerPool;
use crate::store::PackOutput;
use crate::termination::{NodeTermination, VoltageLimits};
use crate::vectorized::VectorizedPool;
use crate::worker::{InitialSoc, WorkerSetup, output_variable_names};

/// Which worker pool realization steps the cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// One shard, cells advanced on a rayon pool of `threads` threads.
    Vectorized { threads: usize },
    /// `workers` shards, one OS thread each.
    Distributed { workers: usize },
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Vectorized { threads: 1 }
    }
}

pub struct SolveOptions {
    pub backend: Backend,
    /// Extra output variables beyond terminal voltage and OCV
    pub output_variables: Vec<String>,
    pub initial_soc: InitialSoc,
    /// Cell parameters applied at setup
    pub inputs: CellInputs,
    /// Per-step parameter updates on top of `inputs`
    pub input_override: Option<InputOverride>,
    /// Overrides the cell model's cut-offs
    pub voltage_limits: Option<VoltageLimits>,
    pub newton: NewtonConfig,
    pub node_termination: Option<NodeTermination>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            output_variables: Vec::new(),
            initial_soc: InitialSoc::default(),
            inputs: CellInputs::default(),
            input_override: None,
            voltage_limits: None,
            newton: NewtonConfig::default(),
            node_termination: None,
        }
    }
}

/// Step `netlist` through `protocol`, advancing cells built by `model`.
pub fn solve(
    netlist: &mut Netlist,
    protocol: &Protocol,
    model: Arc<dyn CellModel>,
    options: SolveOptions,
) -> SimResult<PackOutput> {
    let limits = options
        .voltage_limits
        .unwrap_or_else(|| VoltageLimits::from_model(model.as_ref()));
    let setup = WorkerSetup {
        model,
        dt: protocol.dt(),
        variables: output_variable_names(&options.output_variables),
        initial_soc: options.initial_soc,
        inputs: options.inputs,
    };

    let n_cells = netlist.n_cells();
    info!(n_cells, backend = ?options.backend, steps = protocol.total_steps(), "Solving pack");
    let mut pool: Box<dyn WorkerPool> = match options.backend {
        Backend::Vectorized { threads } => Box::new(VectorizedPool::setup(n_cells, threads, &setup)?),
        Backend::Distributed { workers } => Box::new(DistributedPool::setup(
            Partition::split(n_cells, workers)?,
            &setup,
        )?),
    };

    let mut orchestrator =
        Orchestrator::new(limits).with_solver(Box::new(MnaSolver::new(options.newton)));
    if let Some(check) = options.node_termination {
        orchestrator = orchestrator.with_node_termination(check);
    }
    if let Some(update) = options.input_override {
        orchestrator = orchestrator.with_input_override(update);
    }
    let result = orchestrator.run(netlist, protocol, pool.as_mut());
    pool.shutdown()?;
    result
}
