//! Named per-cell parameter values handed to the cell integrators.

use std::ops::Range;

use pf_core::ensure_len;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Per-cell values keyed by input name, each `[global cell]`.
///
/// Applied once at setup and again whenever an override arrives; a value
/// holds until the same input is set again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellInputs {
    values: Vec<(String, Vec<f64>)>,
}

impl CellInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` for every cell, replacing any earlier values.
    pub fn with(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = values,
            None => self.values.push((name, values)),
        }
        self
    }

    /// Same value for each of `n_cells` cells.
    pub fn uniform(self, name: impl Into<String>, value: f64, n_cells: usize) -> Self {
        self.with(name, vec![value; n_cells])
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.values.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Every input covers `n_cells` cells with finite values and is one the
    /// model accepts.
    pub fn validate(&self, n_cells: usize, accepted: &[String]) -> SimResult<()> {
        for (name, values) in &self.values {
            if !accepted.iter().any(|a| a == name) {
                return Err(SimError::InvalidArg {
                    what: format!("cell model has no input named {name:?}"),
                });
            }
            ensure_len("cell input values", n_cells, values.len())?;
            if let Some(c) = values.iter().position(|v| !v.is_finite()) {
                return Err(SimError::InvalidArg {
                    what: format!("input {name:?} is not finite for cell {c}"),
                });
            }
        }
        Ok(())
    }

    /// The values for the cells in `range`, re-indexed from zero.
    pub fn slice(&self, range: Range<usize>) -> SimResult<CellInputs> {
        let values = self
            .values
            .iter()
            .map(|(n, v)| {
                v.get(range.clone())
                    .map(|part| (n.clone(), part.to_vec()))
                    .ok_or_else(|| SimError::InvalidArg {
                        what: format!("input {n:?} has {} values, cells {range:?} requested", v.len()),
                    })
            })
            .collect::<SimResult<Vec<_>>>()?;
        Ok(CellInputs { values })
    }
}
