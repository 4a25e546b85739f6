//! Compiled step protocol.

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, ProtocolResult};

/// Whether a segment's setpoints are terminal currents or powers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    Current,
    Power,
}

/// A run of setpoints sharing one step type and termination threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub setpoints: Vec<f64>,
    /// Cell voltage threshold ending the segment early, if any (V)
    pub termination: Option<f64>,
    pub step_type: StepType,
}

impl Segment {
    pub fn current(setpoints: Vec<f64>, termination: Option<f64>) -> Self {
        Self {
            setpoints,
            termination,
            step_type: StepType::Current,
        }
    }

    pub fn power(setpoints: Vec<f64>, termination: Option<f64>) -> Self {
        Self {
            setpoints,
            termination,
            step_type: StepType::Power,
        }
    }

    pub fn len(&self) -> usize {
        self.setpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setpoints.is_empty()
    }
}

/// Immutable, ordered segments plus the fixed time increment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Protocol {
    segments: Vec<Segment>,
    dt: f64,
}

impl Protocol {
    pub fn new(dt: f64, segments: Vec<Segment>) -> ProtocolResult<Self> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(ProtocolError::Invalid {
                what: format!("time increment must be positive, got {dt}"),
            });
        }
        if segments.is_empty() {
            return Err(ProtocolError::Invalid {
                what: "protocol has no segments".into(),
            });
        }
        for (i, seg) in segments.iter().enumerate() {
            if seg.is_empty() {
                return Err(ProtocolError::Invalid {
                    what: format!("segment {i} has no setpoints"),
                });
            }
            if seg.setpoints.iter().any(|v| !v.is_finite()) {
                return Err(ProtocolError::Invalid {
                    what: format!("segment {i} has a non-finite setpoint"),
                });
            }
        }
        Ok(Self { segments, dt })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Total setpoints across all segments.
    pub fn total_steps(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn first_setpoint(&self) -> f64 {
        self.segments[0].setpoints[0]
    }

    pub fn first_step_type(&self) -> StepType {
        self.segments[0].step_type
    }

    pub fn flattened(&self) -> Vec<f64> {
        self.segments
            .iter()
            .flat_map(|s| s.setpoints.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_and_flattening() {
        let p = Protocol::new(
            1.0,
            vec![
                Segment::current(vec![1.0, 1.0], Some(3.0)),
                Segment::power(vec![5.0], None),
            ],
        )
        .unwrap();
        assert_eq!(p.total_steps(), 3);
        assert_eq!(p.flattened(), vec![1.0, 1.0, 5.0]);
        assert_eq!(p.first_step_type(), StepType::Current);
    }

    #[test]
    fn rejects_empty_or_bad_dt() {
        assert!(Protocol::new(0.0, vec![Segment::current(vec![1.0], None)]).is_err());
        assert!(Protocol::new(1.0, vec![]).is_err());
        assert!(Protocol::new(1.0, vec![Segment::current(vec![], None)]).is_err());
    }
}
