//! Result data types.

use pf_sim::{PackOutput, TerminationReport};
use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub pack_id: String,
    pub timestamp: String,
    pub solver_version: String,
    pub n_cells: usize,
    pub steps_total: usize,
    pub steps_completed: usize,
    pub variables: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terminations: Vec<TerminationReport>,
}

impl RunManifest {
    /// Manifest for `output`, stamped with the current UTC time.
    pub fn for_output(
        run_id: RunId,
        pack_id: &str,
        solver_version: &str,
        steps_total: usize,
        output: &PackOutput,
    ) -> Self {
        Self {
            run_id,
            pack_id: pack_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            solver_version: solver_version.to_string(),
            n_cells: output.n_cells(),
            steps_total,
            steps_completed: output.steps_completed,
            variables: output.variable_names().map(String::from).collect(),
            terminations: output.terminations.clone(),
        }
    }
}

/// One line of `timeseries.jsonl`: everything recorded at one global step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesRecord {
    pub step: usize,
    pub time_s: f64,
    pub pack: PackSnapshot,
    pub cell_current_a: Vec<f64>,
    pub internal_resistance_ohm: Vec<f64>,
    pub node_voltage_v: Vec<f64>,
    /// Per-cell values in manifest variable order
    pub variables: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PackSnapshot {
    pub current_a: f64,
    pub voltage_v: f64,
    pub power_w: f64,
}

/// Split a run into per-step records.
pub fn records_from_output(output: &PackOutput) -> Vec<TimeseriesRecord> {
    (0..output.steps_completed)
        .map(|step| TimeseriesRecord {
            step,
            time_s: output.times[step],
            pack: PackSnapshot {
                current_a: output.pack_current[step],
                voltage_v: output.pack_voltage[step],
                power_w: output.pack_power[step],
            },
            cell_current_a: output.cell_current[step].clone(),
            internal_resistance_ohm: output.internal_resistance[step].clone(),
            node_voltage_v: output.node_voltages[step].clone(),
            variables: output
                .variables
                .iter()
                .map(|(_, rows)| rows[step].clone())
                .collect(),
        })
        .collect()
}

/// Reassemble a run from its manifest and records.
pub fn output_from_records(manifest: &RunManifest, records: &[TimeseriesRecord]) -> PackOutput {
    let variables = manifest
        .variables
        .iter()
        .enumerate()
        .map(|(v, name)| {
            let values = records
                .iter()
                .map(|r| r.variables.get(v).cloned().unwrap_or_default())
                .collect();
            (name.clone(), values)
        })
        .collect();
    PackOutput {
        times: records.iter().map(|r| r.time_s).collect(),
        pack_current: records.iter().map(|r| r.pack.current_a).collect(),
        pack_voltage: records.iter().map(|r| r.pack.voltage_v).collect(),
        pack_power: records.iter().map(|r| r.pack.power_w).collect(),
        cell_current: records.iter().map(|r| r.cell_current_a.clone()).collect(),
        internal_resistance: records
            .iter()
            .map(|r| r.internal_resistance_ohm.clone())
            .collect(),
        node_voltages: records.iter().map(|r| r.node_voltage_v.clone()).collect(),
        variables,
        terminations: manifest.terminations.clone(),
        steps_completed: records.len(),
    }
}
