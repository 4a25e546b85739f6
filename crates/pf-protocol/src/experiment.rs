//! Experiment description schema.

use serde::{Deserialize, Serialize};

use crate::ProtocolResult;

/// An ordered list of operating steps sampled at a fixed period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    /// Fixed time increment between setpoints (s)
    pub period_s: f64,
    /// Number of times the step list is repeated
    #[serde(default = "default_cycles")]
    pub cycles: usize,
    pub steps: Vec<StepDef>,
}

fn default_cycles() -> usize {
    1
}

/// One operating step. Currents and powers are magnitudes; the step kind
/// fixes the sign (discharge positive).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum StepDef {
    Discharge {
        current_a: f64,
        duration_s: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until_v: Option<f64>,
    },
    Charge {
        current_a: f64,
        duration_s: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until_v: Option<f64>,
    },
    Rest {
        duration_s: f64,
    },
    DischargePower {
        power_w: f64,
        duration_s: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until_v: Option<f64>,
    },
    ChargePower {
        power_w: f64,
        duration_s: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until_v: Option<f64>,
    },
    /// Current profile, linearly interpolated at multiples of the period.
    DriveCycle {
        times_s: Vec<f64>,
        current_a: Vec<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until_v: Option<f64>,
    },
}

impl Experiment {
    pub fn new(period_s: f64, steps: Vec<StepDef>) -> Self {
        Self {
            period_s,
            cycles: 1,
            steps,
        }
    }

    pub fn from_yaml_str(content: &str) -> ProtocolResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml_string(&self) -> ProtocolResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_steps_with_defaults() {
        let yaml = r#"
period_s: 10.0
steps:
  - type: Discharge
    current_a: 5.0
    duration_s: 600
    until_v: 3.2
  - type: Rest
    duration_s: 300
"#;
        let exp = Experiment::from_yaml_str(yaml).unwrap();
        assert_eq!(exp.cycles, 1);
        assert_eq!(exp.steps.len(), 2);
        assert_eq!(
            exp.steps[0],
            StepDef::Discharge {
                current_a: 5.0,
                duration_s: 600.0,
                until_v: Some(3.2)
            }
        );
        assert_eq!(exp.steps[1], StepDef::Rest { duration_s: 300.0 });
    }

    #[test]
    fn unknown_step_type_is_rejected() {
        let yaml = "period_s: 1.0\nsteps:\n  - type: Hold\n    duration_s: 5\n";
        assert!(Experiment::from_yaml_str(yaml).is_err());
    }
}
