//! Error types for cell operations.

use pf_core::PfError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CellError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Unknown output variable: {name}")]
    UnknownVariable { name: String },

    #[error("Unknown input parameter: {name}")]
    UnknownInput { name: String },

    #[error("Non-physical condition in cell {cell}: {what}")]
    NonPhysical { cell: usize, what: &'static str },

    #[error(transparent)]
    Core(#[from] PfError),
}

pub type CellResult<T> = Result<T, CellError>;
