//! Lowers an `Experiment` into a flat segment protocol.

use pf_core::ensure_finite;

use crate::experiment::{Experiment, StepDef};
use crate::protocol::{Protocol, Segment};
use crate::{ProtocolError, ProtocolResult};

/// Compile an experiment into segments of per-step setpoints.
///
/// Each step contributes `round(duration / period)` setpoints. Charge steps
/// negate their magnitude. Every cycle repeats the step list verbatim.
pub fn compile(experiment: &Experiment) -> ProtocolResult<Protocol> {
    let period = ensure_finite(experiment.period_s, "experiment period")?;
    if period <= 0.0 {
        return Err(ProtocolError::Invalid {
            what: format!("period must be positive, got {period}"),
        });
    }
    if experiment.cycles == 0 {
        return Err(ProtocolError::Invalid {
            what: "cycles must be at least 1".into(),
        });
    }
    if experiment.steps.is_empty() {
        return Err(ProtocolError::Invalid {
            what: "experiment has no steps".into(),
        });
    }

    let mut cycle = Vec::with_capacity(experiment.steps.len());
    for (index, step) in experiment.steps.iter().enumerate() {
        cycle.push(compile_step(index, step, period)?);
    }

    let segments = std::iter::repeat_n(cycle, experiment.cycles)
        .flatten()
        .collect();
    Protocol::new(period, segments)
}

fn compile_step(index: usize, step: &StepDef, period: f64) -> ProtocolResult<Segment> {
    let segment = match step {
        StepDef::Discharge {
            current_a,
            duration_s,
            until_v,
        } => {
            let n = step_count(index, *duration_s, period)?;
            Segment::current(vec![magnitude(*current_a, "current")?; n], *until_v)
        }
        StepDef::Charge {
            current_a,
            duration_s,
            until_v,
        } => {
            let n = step_count(index, *duration_s, period)?;
            Segment::current(vec![-magnitude(*current_a, "current")?; n], *until_v)
        }
        StepDef::Rest { duration_s } => {
            let n = step_count(index, *duration_s, period)?;
            Segment::current(vec![0.0; n], None)
        }
        StepDef::DischargePower {
            power_w,
            duration_s,
            until_v,
        } => {
            let n = step_count(index, *duration_s, period)?;
            Segment::power(vec![magnitude(*power_w, "power")?; n], *until_v)
        }
        StepDef::ChargePower {
            power_w,
            duration_s,
            until_v,
        } => {
            let n = step_count(index, *duration_s, period)?;
            Segment::power(vec![-magnitude(*power_w, "power")?; n], *until_v)
        }
        StepDef::DriveCycle {
            times_s,
            current_a,
            until_v,
        } => Segment::current(sample_profile(index, times_s, current_a, period)?, *until_v),
    };
    Ok(segment)
}

fn magnitude(value: f64, what: &'static str) -> ProtocolResult<f64> {
    let v = ensure_finite(value, what)?;
    if v < 0.0 {
        return Err(ProtocolError::Invalid {
            what: format!("{what} must be given as a non-negative magnitude, got {v}"),
        });
    }
    Ok(v)
}

fn step_count(index: usize, duration_s: f64, period_s: f64) -> ProtocolResult<usize> {
    let duration = ensure_finite(duration_s, "step duration")?;
    let n = (duration / period_s).round();
    if n < 1.0 {
        return Err(ProtocolError::EmptyStep {
            index,
            duration_s,
            period_s,
        });
    }
    Ok(n as usize)
}

fn sample_profile(
    index: usize,
    times: &[f64],
    values: &[f64],
    period: f64,
) -> ProtocolResult<Vec<f64>> {
    if times.len() != values.len() || times.len() < 2 {
        return Err(ProtocolError::Invalid {
            what: format!(
                "drive cycle {index} needs matching time and current tables of at least 2 points"
            ),
        });
    }
    if times.windows(2).any(|w| !(w[1] > w[0])) {
        return Err(ProtocolError::Invalid {
            what: format!("drive cycle {index} times must be strictly increasing"),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ProtocolError::Invalid {
            what: format!("drive cycle {index} has a non-finite current"),
        });
    }

    let t0 = times[0];
    let n = step_count(index, times[times.len() - 1] - t0, period)?;
    let mut seg = 0;
    let samples = (0..n)
        .map(|k| {
            let t = t0 + k as f64 * period;
            while seg + 2 < times.len() && times[seg + 1] <= t {
                seg += 1;
            }
            let (ta, tb) = (times[seg], times[seg + 1]);
            let (va, vb) = (values[seg], values[seg + 1]);
            let frac = ((t - ta) / (tb - ta)).clamp(0.0, 1.0);
            va + frac * (vb - va)
        })
        .collect();
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StepType;

    #[test]
    fn discharge_rest_charge_signs_and_counts() {
        let exp = Experiment::new(
            10.0,
            vec![
                StepDef::Discharge {
                    current_a: 2.0,
                    duration_s: 60.0,
                    until_v: Some(3.0),
                },
                StepDef::Rest { duration_s: 30.0 },
                StepDef::Charge {
                    current_a: 1.0,
                    duration_s: 20.0,
                    until_v: Some(4.1),
                },
            ],
        );
        let p = compile(&exp).unwrap();
        let segs = p.segments();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].setpoints, vec![2.0; 6]);
        assert_eq!(segs[0].termination, Some(3.0));
        assert_eq!(segs[1].setpoints, vec![0.0; 3]);
        assert_eq!(segs[1].termination, None);
        assert_eq!(segs[2].setpoints, vec![-1.0; 2]);
        assert_eq!(p.total_steps(), 11);
        assert_eq!(p.dt(), 10.0);
    }

    #[test]
    fn power_steps_compile_to_power_segments() {
        let exp = Experiment::new(
            1.0,
            vec![StepDef::ChargePower {
                power_w: 4.0,
                duration_s: 3.0,
                until_v: None,
            }],
        );
        let p = compile(&exp).unwrap();
        assert_eq!(p.segments()[0].step_type, StepType::Power);
        assert_eq!(p.segments()[0].setpoints, vec![-4.0; 3]);
    }

    #[test]
    fn cycles_repeat_the_step_list() {
        let mut exp = Experiment::new(
            1.0,
            vec![
                StepDef::Discharge {
                    current_a: 1.0,
                    duration_s: 2.0,
                    until_v: None,
                },
                StepDef::Rest { duration_s: 1.0 },
            ],
        );
        exp.cycles = 3;
        let p = compile(&exp).unwrap();
        assert_eq!(p.segments().len(), 6);
        assert_eq!(p.flattened(), vec![1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn drive_cycle_is_interpolated_at_the_period() {
        let exp = Experiment::new(
            0.5,
            vec![StepDef::DriveCycle {
                times_s: vec![0.0, 1.0, 2.0],
                current_a: vec![0.0, 2.0, -2.0],
                until_v: None,
            }],
        );
        let p = compile(&exp).unwrap();
        assert_eq!(p.segments()[0].setpoints, vec![0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn step_shorter_than_period_is_rejected() {
        let exp = Experiment::new(10.0, vec![StepDef::Rest { duration_s: 2.0 }]);
        assert!(matches!(
            compile(&exp),
            Err(ProtocolError::EmptyStep { index: 0, .. })
        ));
    }

    #[test]
    fn negative_magnitudes_are_rejected() {
        let exp = Experiment::new(
            1.0,
            vec![StepDef::Discharge {
                current_a: -1.0,
                duration_s: 5.0,
                until_v: None,
            }],
        );
        assert!(matches!(compile(&exp), Err(ProtocolError::Invalid { .. })));
    }
}
