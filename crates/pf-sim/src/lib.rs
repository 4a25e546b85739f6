//! pf-sim: parallel stepping of battery packs.
//!
//! The [`Orchestrator`] owns the step loop. Each global step it solves the
//! pack circuit for the per-cell currents, then advances every cell through a
//! [`WorkerPool`]:
//! - [`VectorizedPool`]: one shard, cells advanced on a local rayon pool
//! - [`DistributedPool`]: one thread per shard, driven over channels
//!
//! [`solve`] wires a pool and an orchestrator together for the common case.

pub mod distributed;
pub mod error;
pub mod events;
pub mod inputs;
pub mod orchestrator;
pub mod partition;
pub mod pool;
pub mod solve;
pub mod store;
pub mod termination;
pub mod vectorized;
pub mod worker;

pub use distributed::DistributedPool;
pub use error::{SimError, SimResult};
pub use events::EventTracker;
pub use inputs::CellInputs;
pub use orchestrator::{
    InputOverride, Orchestrator, PackState, StepProgress, internal_resistance, rest_flags,
};
pub use partition::Partition;
pub use pool::{OutputBlock, WorkerPool};
pub use solve::{Backend, SolveOptions, solve};
pub use store::{OutputStore, PackOutput};
pub use termination::{
    NodeTermination, TerminationReason, TerminationReport, VoltageLimits, termination_reasons,
};
pub use vectorized::VectorizedPool;
pub use worker::{Executor, InitialSoc, ShardWorker, WorkerSetup, output_variable_names};
