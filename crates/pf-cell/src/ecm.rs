//! First-order equivalent-circuit (Thevenin) reference cell.
//!
//! State: state of charge, RC-pair overpotential and discharged charge.
//! Terminal voltage is `OCV(soc) - v_rc - I * R0`.

use std::sync::Arc;

use pf_core::{Charge, amp_hours, coulombs};

use crate::cell::{CellIntegrator, CellModel, variables};
use crate::error::{CellError, CellResult};
use crate::integrator::IntegratorType;
use crate::model::TransientModel;

pub const MIN_VOLTAGE_EVENT: &str = "Minimum voltage Event";
pub const MAX_VOLTAGE_EVENT: &str = "Maximum voltage Event";
pub const ZERO_SOC_EVENT: &str = "Zero state of charge Event";

/// Per-cell override of `EcmParams::r0`.
pub const SERIES_RESISTANCE_INPUT: &str = "Series resistance [Ohm]";

/// Piecewise-linear open-circuit voltage curve over state of charge.
///
/// Extrapolates linearly beyond the first and last points so an over-driven
/// cell keeps moving toward its cut-off.
#[derive(Clone, Debug)]
pub struct OcvCurve {
    soc: Vec<f64>,
    ocv: Vec<f64>,
}

impl OcvCurve {
    pub fn new(soc: Vec<f64>, ocv: Vec<f64>) -> CellResult<Self> {
        if soc.len() != ocv.len() || soc.len() < 2 {
            return Err(CellError::InvalidArg {
                what: format!(
                    "OCV curve needs matching tables of at least 2 points (soc={}, ocv={})",
                    soc.len(),
                    ocv.len()
                ),
            });
        }
        if soc.windows(2).any(|w| w[1] <= w[0]) {
            return Err(CellError::InvalidArg {
                what: "OCV curve state of charge must be strictly increasing".into(),
            });
        }
        Ok(Self { soc, ocv })
    }

    pub fn at(&self, soc: f64) -> f64 {
        let n = self.soc.len();
        let seg = match self.soc.iter().position(|&s| s > soc) {
            Some(0) => 0,
            Some(i) => i - 1,
            None => n - 2,
        };
        let (s0, s1) = (self.soc[seg], self.soc[seg + 1]);
        let (v0, v1) = (self.ocv[seg], self.ocv[seg + 1]);
        v0 + (soc - s0) * (v1 - v0) / (s1 - s0)
    }
}

impl Default for OcvCurve {
    fn default() -> Self {
        Self {
            soc: vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0],
            ocv: vec![
                3.00, 3.45, 3.55, 3.60, 3.65, 3.70, 3.78, 3.87, 3.95, 4.05, 4.20,
            ],
        }
    }
}

/// Parameters shared by every cell of an `EcmModel`.
#[derive(Clone, Debug)]
pub struct EcmParams {
    pub capacity: Charge,
    /// Series (ohmic) resistance (Ohm)
    pub r0: f64,
    /// RC-pair resistance (Ohm)
    pub r1: f64,
    /// RC-pair capacitance (F)
    pub c1: f64,
    pub ocv: OcvCurve,
    pub v_lower: f64,
    pub v_upper: f64,
    /// Integrator sub-steps per advance
    pub substeps: usize,
    pub integrator: IntegratorType,
}

impl Default for EcmParams {
    fn default() -> Self {
        Self {
            capacity: amp_hours(5.0),
            r0: 0.02,
            r1: 0.015,
            c1: 2_000.0,
            ocv: OcvCurve::default(),
            v_lower: 2.5,
            v_upper: 4.2,
            substeps: 10,
            integrator: IntegratorType::default(),
        }
    }
}

impl EcmParams {
    fn validate(&self) -> CellResult<()> {
        let capacity = coulombs(self.capacity);
        let checks = [
            (capacity > 0.0, "capacity must be positive"),
            (self.r0 > 0.0, "r0 must be positive"),
            (self.r1 > 0.0, "r1 must be positive"),
            (self.c1 > 0.0, "c1 must be positive"),
            (self.v_lower < self.v_upper, "v_lower must be below v_upper"),
            (self.substeps > 0, "substeps must be at least 1"),
        ];
        for (ok, what) in checks {
            if !ok {
                return Err(CellError::InvalidArg { what: what.into() });
            }
        }
        Ok(())
    }
}

/// Equivalent-circuit cell model with optional per-cell capacity variation.
#[derive(Clone, Debug)]
pub struct EcmModel {
    params: Arc<EcmParams>,
    capacity_scale: Option<Vec<f64>>,
}

impl EcmModel {
    pub fn new(params: EcmParams) -> CellResult<Self> {
        params.validate()?;
        Ok(Self {
            params: Arc::new(params),
            capacity_scale: None,
        })
    }

    /// Scale each cell's capacity by the matching factor (cell-to-cell spread).
    pub fn with_capacity_scale(mut self, scale: Vec<f64>) -> CellResult<Self> {
        if scale.iter().any(|&s| !(s > 0.0 && s.is_finite())) {
            return Err(CellError::InvalidArg {
                what: "capacity scale factors must be positive".into(),
            });
        }
        self.capacity_scale = Some(scale);
        Ok(self)
    }

    pub fn params(&self) -> &EcmParams {
        &self.params
    }
}

impl CellModel for EcmModel {
    fn variable_names(&self) -> Vec<String> {
        [
            variables::TERMINAL_VOLTAGE,
            variables::OPEN_CIRCUIT_VOLTAGE,
            variables::STATE_OF_CHARGE,
            variables::OVERPOTENTIAL,
            variables::DISCHARGE_CAPACITY,
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    fn event_names(&self) -> Vec<String> {
        [MIN_VOLTAGE_EVENT, MAX_VOLTAGE_EVENT, ZERO_SOC_EVENT]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn voltage_limits(&self) -> (f64, f64) {
        (self.params.v_lower, self.params.v_upper)
    }

    fn input_names(&self) -> Vec<String> {
        vec![SERIES_RESISTANCE_INPUT.to_string()]
    }

    fn build(&self, cell: usize, initial_soc: f64) -> CellResult<Box<dyn CellIntegrator>> {
        if !(0.0..=1.0).contains(&initial_soc) {
            return Err(CellError::InvalidArg {
                what: format!("initial state of charge {initial_soc} for cell {cell} outside [0, 1]"),
            });
        }
        let scale = match &self.capacity_scale {
            None => 1.0,
            Some(scale) => *scale.get(cell).ok_or_else(|| CellError::InvalidArg {
                what: format!(
                    "no capacity scale for cell {cell} ({} factors given)",
                    scale.len()
                ),
            })?,
        };
        Ok(Box::new(EcmCell {
            cell,
            params: Arc::clone(&self.params),
            capacity_c: coulombs(self.params.capacity) * scale,
            r0: self.params.r0,
            state: EcmState {
                soc: initial_soc,
                v_rc: 0.0,
                discharged_c: 0.0,
            },
        }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EcmState {
    pub soc: f64,
    pub v_rc: f64,
    /// Net charge removed since setup (C)
    pub discharged_c: f64,
}

/// Right-hand side at a fixed applied current.
struct EcmDynamics<'a> {
    params: &'a EcmParams,
    capacity_c: f64,
    current: f64,
}

impl TransientModel for EcmDynamics<'_> {
    type State = EcmState;

    fn rhs(&self, _t: f64, x: &EcmState) -> CellResult<EcmState> {
        let p = self.params;
        Ok(EcmState {
            soc: -self.current / self.capacity_c,
            v_rc: -x.v_rc / (p.r1 * p.c1) + self.current / p.c1,
            discharged_c: self.current,
        })
    }

    fn add(&self, a: &EcmState, b: &EcmState) -> EcmState {
        EcmState {
            soc: a.soc + b.soc,
            v_rc: a.v_rc + b.v_rc,
            discharged_c: a.discharged_c + b.discharged_c,
        }
    }

    fn scale(&self, a: &EcmState, scale: f64) -> EcmState {
        EcmState {
            soc: a.soc * scale,
            v_rc: a.v_rc * scale,
            discharged_c: a.discharged_c * scale,
        }
    }
}

/// One equivalent-circuit cell.
pub struct EcmCell {
    cell: usize,
    params: Arc<EcmParams>,
    capacity_c: f64,
    r0: f64,
    state: EcmState,
}

impl EcmCell {
    pub fn state(&self) -> EcmState {
        self.state
    }

    fn terminal_voltage(&self, current: f64) -> f64 {
        self.params.ocv.at(self.state.soc) - self.state.v_rc - current * self.r0
    }
}

impl CellIntegrator for EcmCell {
    fn advance(&mut self, current: f64, dt: f64) -> CellResult<()> {
        if !current.is_finite() {
            return Err(CellError::NonPhysical {
                cell: self.cell,
                what: "applied current is not finite",
            });
        }
        let dynamics = EcmDynamics {
            params: &self.params,
            capacity_c: self.capacity_c,
            current,
        };
        let h = dt / self.params.substeps as f64;
        let mut x = self.state;
        for k in 0..self.params.substeps {
            x = self.params.integrator.step(&dynamics, k as f64 * h, &x, h)?;
        }
        if !(x.soc.is_finite() && x.v_rc.is_finite()) {
            return Err(CellError::NonPhysical {
                cell: self.cell,
                what: "state diverged",
            });
        }
        self.state = x;
        Ok(())
    }

    fn evaluate(&self, current: f64) -> Vec<f64> {
        vec![
            self.terminal_voltage(current),
            self.params.ocv.at(self.state.soc),
            self.state.soc,
            self.state.v_rc,
            self.state.discharged_c / 3600.0,
        ]
    }

    fn events(&self, current: f64) -> Vec<f64> {
        let v = self.terminal_voltage(current);
        vec![
            v - self.params.v_lower,
            self.params.v_upper - v,
            self.state.soc,
        ]
    }

    fn set_input(&mut self, name: &str, value: f64) -> CellResult<()> {
        if name != SERIES_RESISTANCE_INPUT {
            return Err(CellError::UnknownInput { name: name.into() });
        }
        if !(value > 0.0 && value.is_finite()) {
            return Err(CellError::InvalidArg {
                what: format!("series resistance of cell {} must be positive, got {value}", self.cell),
            });
        }
        self.r0 = value;
        Ok(())
    }
}
