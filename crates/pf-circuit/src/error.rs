//! Circuit construction and solve errors.

use pf_core::PfError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CircuitError {
    #[error("Invalid netlist: {what}")]
    InvalidNetlist { what: String },

    #[error("Branch {branch} refers to non-existent node {node}")]
    InvalidNodeRef { branch: String, node: u32 },

    #[error("Node {node} has no DC path to ground")]
    FloatingNode { node: String },

    #[error("Circuit matrix is singular")]
    Singular,

    #[error("Requested power {requested_w} W exceeds deliverable maximum {max_w} W")]
    PowerUnreachable { requested_w: f64, max_w: f64 },

    #[error("Convergence failed: {what}")]
    ConvergenceFailed { what: String },

    #[error(transparent)]
    Core(#[from] PfError),
}

pub type CircuitResult<T> = Result<T, CircuitError>;
