//! pf-protocol: experiment descriptions and their compiled step protocol.

pub mod compile;
pub mod experiment;
pub mod protocol;

pub use compile::compile;
pub use experiment::{Experiment, StepDef};
pub use protocol::{Protocol, Segment, StepType};

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid experiment: {what}")]
    Invalid { what: String },

    #[error("Step {index} produces no setpoints: duration {duration_s} s is shorter than the {period_s} s period")]
    EmptyStep {
        index: usize,
        duration_s: f64,
        period_s: f64,
    },

    #[error(transparent)]
    Core(#[from] pf_core::PfError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub fn load_yaml(path: &std::path::Path) -> ProtocolResult<Experiment> {
    let content = std::fs::read_to_string(path)?;
    Experiment::from_yaml_str(&content)
}
