//! Early-exit conditions evaluated on cell and node voltages.

use pf_cell::CellModel;
use serde::{Deserialize, Serialize};

/// Per-cell terminal voltage cut-offs (V).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageLimits {
    pub lower: f64,
    pub upper: f64,
}

impl VoltageLimits {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn from_model(model: &dyn CellModel) -> Self {
        let (lower, upper) = model.voltage_limits();
        Self { lower, upper }
    }
}

/// Predicate over node voltages (ground first) that ends the segment when true.
pub type NodeTermination = Box<dyn Fn(&[f64]) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Some cell fell below the lower cut-off; `min` is the lowest cell voltage.
    LowerCutoff { min: f64 },
    /// Some cell rose above the upper cut-off; `max` is the highest cell voltage.
    UpperCutoff { max: f64 },
    /// Cell voltages straddle the segment threshold.
    ThresholdCrossed { threshold: f64 },
    NodeVoltage,
}

/// Where and why a segment ended early.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationReport {
    pub segment: usize,
    pub step_in_segment: usize,
    pub global_step: usize,
    pub reasons: Vec<TerminationReason>,
}

/// Every termination condition that holds for the given voltages.
pub fn termination_reasons(
    cell_voltages: &[f64],
    limits: VoltageLimits,
    threshold: Option<f64>,
    node_voltages: &[f64],
    node_check: Option<&NodeTermination>,
) -> Vec<TerminationReason> {
    let mut reasons = Vec::new();
    let min = cell_voltages.iter().copied().fold(f64::INFINITY, f64::min);
    let max = cell_voltages.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min < limits.lower {
        reasons.push(TerminationReason::LowerCutoff { min });
    }
    if max > limits.upper {
        reasons.push(TerminationReason::UpperCutoff { max });
    }
    if let Some(threshold) = threshold {
        let below = cell_voltages.iter().any(|&v| v - threshold < 0.0);
        let above = cell_voltages.iter().any(|&v| v - threshold > 0.0);
        if below && above {
            reasons.push(TerminationReason::ThresholdCrossed { threshold });
        }
    }
    if node_check.is_some_and(|check| check(node_voltages)) {
        reasons.push(TerminationReason::NodeVoltage);
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: VoltageLimits = VoltageLimits {
        lower: 2.5,
        upper: 4.2,
    };

    #[test]
    fn within_limits_is_quiet() {
        assert!(termination_reasons(&[3.6, 3.7], LIMITS, None, &[], None).is_empty());
    }

    #[test]
    fn cutoffs_report_extremes() {
        let r = termination_reasons(&[2.4, 3.0, 4.3], LIMITS, None, &[], None);
        assert_eq!(
            r,
            vec![
                TerminationReason::LowerCutoff { min: 2.4 },
                TerminationReason::UpperCutoff { max: 4.3 }
            ]
        );
    }

    #[test]
    fn threshold_needs_cells_on_both_sides() {
        assert!(termination_reasons(&[3.1, 3.2], LIMITS, Some(3.0), &[], None).is_empty());
        assert!(termination_reasons(&[3.0, 3.2], LIMITS, Some(3.0), &[], None).is_empty());
        assert_eq!(
            termination_reasons(&[2.9, 3.2], LIMITS, Some(3.0), &[], None),
            vec![TerminationReason::ThresholdCrossed { threshold: 3.0 }]
        );
    }

    #[test]
    fn node_predicate_is_consulted() {
        let check: NodeTermination = Box::new(|nodes: &[f64]| nodes.iter().any(|&v| v > 10.0));
        assert!(termination_reasons(&[3.7], LIMITS, None, &[0.0, 3.7], Some(&check)).is_empty());
        assert_eq!(
            termination_reasons(&[3.7], LIMITS, None, &[0.0, 11.0], Some(&check)),
            vec![TerminationReason::NodeVoltage]
        );
    }
}
