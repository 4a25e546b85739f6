//! Error types for pack stepping.

use pf_cell::CellError;
use pf_circuit::CircuitError;
use pf_core::PfError;
use thiserror::Error;

/// Errors raised while setting up or stepping a pack.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Worker setup failed: {what}")]
    Setup { what: String },

    #[error("Output variable not provided by the workers: {name}")]
    MissingVariable { name: String },

    #[error("Shard {shard} disconnected")]
    WorkerDisconnected { shard: usize },

    #[error("Shard {shard} panicked")]
    WorkerPanicked { shard: usize },

    #[error("Circuit error: {0}")]
    Circuit(#[from] CircuitError),

    #[error("Cell error: {0}")]
    Cell(#[from] CellError),

    #[error(transparent)]
    Core(#[from] PfError),
}

pub type SimResult<T> = Result<T, SimError>;
