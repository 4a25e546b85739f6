//! Circuit solve: modified nodal analysis with current or power excitation.

use nalgebra::{DMatrix, DVector, Dyn, LU};
use pf_core::NodeId;

use crate::error::{CircuitError, CircuitResult};
use crate::jacobian::finite_difference_jacobian;
use crate::netlist::{BranchKind, Netlist};
use crate::newton::{NewtonConfig, newton_solve};

/// Terminal excitation applied to the pack for one solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Excitation {
    /// Terminal current in amps (discharge positive).
    Current(f64),
    /// Terminal power in watts (discharge positive).
    Power(f64),
}

impl Excitation {
    pub fn value(self) -> f64 {
        match self {
            Self::Current(v) | Self::Power(v) => v,
        }
    }
}

/// Result of one circuit solve.
#[derive(Clone, Debug, PartialEq)]
pub struct CircuitSolution {
    /// Node voltages indexed by node id; ground is 0.
    pub node_voltages: Vec<f64>,
    /// Branch currents indexed by branch id, flowing node1 -> node2.
    pub branch_currents: Vec<f64>,
    /// Current through each cell's OCV source in cell order, flowing from the
    /// positive side through the source. Negative while a cell discharges.
    pub cell_currents: Vec<f64>,
    pub terminal_current: f64,
    pub terminal_voltage: f64,
    pub terminal_power: f64,
}

/// The circuit solve consumed by the stepping loop.
///
/// Must tolerate the netlist's OCV and resistance values being rewritten
/// between calls.
pub trait CircuitSolver {
    fn solve(&self, netlist: &Netlist, excitation: Excitation) -> CircuitResult<CircuitSolution>;
}

/// Modified nodal analysis solver.
///
/// The system is linear in the terminal current, so it is factored once per
/// call and solved for the unit response; power excitation then runs Newton on
/// the scalar terminal current.
#[derive(Clone, Debug, Default)]
pub struct MnaSolver {
    pub newton: NewtonConfig,
}

impl MnaSolver {
    pub fn new(newton: NewtonConfig) -> Self {
        Self { newton }
    }
}

impl CircuitSolver for MnaSolver {
    fn solve(&self, netlist: &Netlist, excitation: Excitation) -> CircuitResult<CircuitSolution> {
        let system = Assembled::new(netlist)?;
        let current = match excitation {
            Excitation::Current(i) => i,
            Excitation::Power(p) => system.current_for_power(p, &self.newton)?,
        };
        Ok(system.solution(current))
    }
}

/// Factored nodal system: x(I) = x_fixed + I * x_unit.
struct Assembled<'a> {
    netlist: &'a Netlist,
    n_v: usize,
    x_fixed: DVector<f64>,
    x_unit: DVector<f64>,
}

fn row(node: NodeId) -> Option<usize> {
    node.idx().checked_sub(1)
}

impl<'a> Assembled<'a> {
    fn new(netlist: &'a Netlist) -> CircuitResult<Self> {
        let n_v = netlist.n_nodes() - 1;
        let dim = n_v + netlist.n_cells();

        let mut a = DMatrix::<f64>::zeros(dim, dim);
        let mut z_fixed = DVector::<f64>::zeros(dim);
        let mut z_unit = DVector::<f64>::zeros(dim);

        for branch in netlist.branches() {
            let (r1, r2) = (row(branch.node1), row(branch.node2));
            match branch.kind {
                BranchKind::InternalResistance { .. } | BranchKind::Resistor => {
                    let g = 1.0 / branch.value;
                    if let Some(i) = r1 {
                        a[(i, i)] += g;
                    }
                    if let Some(j) = r2 {
                        a[(j, j)] += g;
                    }
                    if let (Some(i), Some(j)) = (r1, r2) {
                        a[(i, j)] -= g;
                        a[(j, i)] -= g;
                    }
                }
                BranchKind::VoltageSource { cell } => {
                    let k = n_v + cell;
                    if let Some(i) = r1 {
                        a[(i, k)] += 1.0;
                        a[(k, i)] += 1.0;
                    }
                    if let Some(j) = r2 {
                        a[(j, k)] -= 1.0;
                        a[(k, j)] -= 1.0;
                    }
                    z_fixed[k] = branch.value;
                }
                BranchKind::CurrentSource => {
                    if let Some(i) = r1 {
                        z_unit[i] -= 1.0;
                    }
                    if let Some(j) = r2 {
                        z_unit[j] += 1.0;
                    }
                }
            }
        }

        let lu: LU<f64, Dyn, Dyn> = a.lu();
        let x_fixed = lu.solve(&z_fixed).ok_or(CircuitError::Singular)?;
        let x_unit = lu.solve(&z_unit).ok_or(CircuitError::Singular)?;
        if x_fixed.iter().chain(x_unit.iter()).any(|v| !v.is_finite()) {
            return Err(CircuitError::Singular);
        }

        Ok(Self {
            netlist,
            n_v,
            x_fixed,
            x_unit,
        })
    }

    fn node_voltage(&self, x: &DVector<f64>, node: NodeId) -> f64 {
        row(node).map_or(0.0, |i| x[i])
    }

    fn state(&self, current: f64) -> DVector<f64> {
        &self.x_fixed + current * &self.x_unit
    }

    fn terminal_voltage(&self, current: f64) -> f64 {
        let t = self.netlist.terminal();
        let v1 = row(t.node1).map_or(0.0, |i| self.x_fixed[i] + current * self.x_unit[i]);
        let v2 = row(t.node2).map_or(0.0, |i| self.x_fixed[i] + current * self.x_unit[i]);
        v1 - v2
    }

    /// Terminal current delivering `power`, on the high-voltage branch of the
    /// power curve.
    fn current_for_power(&self, power: f64, config: &NewtonConfig) -> CircuitResult<f64> {
        let v_open = self.terminal_voltage(0.0);
        if v_open.abs() < f64::EPSILON {
            return Err(CircuitError::InvalidNetlist {
                what: "open-circuit terminal voltage is zero; power excitation undefined".into(),
            });
        }
        let r_eq = v_open - self.terminal_voltage(1.0);
        if r_eq > 0.0 {
            let max_w = v_open * v_open / (4.0 * r_eq);
            if power > max_w {
                return Err(CircuitError::PowerUnreachable {
                    requested_w: power,
                    max_w,
                });
            }
        }

        let residual = |x: &DVector<f64>| -> CircuitResult<DVector<f64>> {
            Ok(DVector::from_element(
                1,
                x[0] * self.terminal_voltage(x[0]) - power,
            ))
        };
        let jacobian = |x: &DVector<f64>| -> CircuitResult<DMatrix<f64>> {
            finite_difference_jacobian(x, residual, 1e-7)
        };

        let result = newton_solve(
            DVector::from_element(1, power / v_open),
            residual,
            jacobian,
            config,
        )?;
        tracing::trace!(
            iterations = result.iterations,
            residual_w = result.residual_norm,
            "power solve converged"
        );
        Ok(result.x[0])
    }

    fn solution(&self, current: f64) -> CircuitSolution {
        let x = self.state(current);
        let netlist = self.netlist;

        let mut node_voltages = Vec::with_capacity(netlist.n_nodes());
        node_voltages.push(0.0);
        node_voltages.extend(x.iter().take(self.n_v).copied());

        let branch_currents = netlist
            .branches()
            .iter()
            .map(|b| match b.kind {
                BranchKind::InternalResistance { .. } | BranchKind::Resistor => {
                    (self.node_voltage(&x, b.node1) - self.node_voltage(&x, b.node2)) / b.value
                }
                BranchKind::VoltageSource { cell } => x[self.n_v + cell],
                BranchKind::CurrentSource => current,
            })
            .collect();

        let cell_currents = (0..netlist.n_cells()).map(|c| x[self.n_v + c]).collect();

        let terminal_voltage = self.terminal_voltage(current);
        CircuitSolution {
            node_voltages,
            branch_currents,
            cell_currents,
            terminal_current: current,
            terminal_voltage,
            terminal_power: terminal_voltage * current,
        }
    }
}
