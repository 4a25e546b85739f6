//! The sequential stepping loop that couples the circuit to the workers.
//!
//! Each global step gathers worker outputs, refreshes cell OCV and internal
//! resistance in the network, solves the circuit at the protocol setpoint,
//! records the result and advances every cell through the pool. Early exits
//! happen only between steps.

use pf_circuit::{CircuitSolution, CircuitSolver, Excitation, MnaSolver, Netlist};
use pf_cell::variables;
use pf_core::timing::{Timer, step_timing};
use pf_core::{NEGLIGIBLE_EXCITATION, RESISTANCE_FLOOR, ensure_len};
use pf_protocol::{Protocol, StepType};
use tracing::{debug, info, warn};

use crate::error::{SimError, SimResult};
use crate::inputs::CellInputs;
use crate::pool::WorkerPool;
use crate::store::{OutputStore, PackOutput};
use crate::termination::{NodeTermination, TerminationReport, VoltageLimits, termination_reasons};

/// Reported after every completed global step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepProgress {
    /// Steps completed so far
    pub global_step: usize,
    pub total_steps: usize,
    pub segment: usize,
}

/// Per-step cell parameter overrides, asked once per global step.
pub type InputOverride = Box<dyn FnMut(usize) -> Option<CellInputs>>;

/// `(resting, restarting)` for the setpoint about to be applied.
///
/// `prev` is the setpoint of the previous global step, carried across
/// segment boundaries; `None` only on the first step of a run.
pub fn rest_flags(prev: Option<f64>, cur: f64) -> (bool, bool) {
    match prev {
        Some(prev) if prev == 0.0 => (cur == 0.0, cur != 0.0),
        _ => (false, false),
    }
}

/// Ohmic estimate `|OCV - V| / |I|`.
///
/// A zero estimate is raised to `RESISTANCE_FLOOR`. With no current the
/// estimate is undefined and the cell keeps `previous`.
pub fn internal_resistance(ocv: f64, voltage: f64, current: f64, previous: f64) -> f64 {
    let r = (ocv - voltage).abs() / current.abs();
    if !r.is_finite() {
        previous
    } else if r == 0.0 {
        RESISTANCE_FLOOR
    } else {
        r
    }
}

/// Orchestrator-owned mutable state carried between steps.
#[derive(Debug, Clone)]
pub struct PackState {
    pub global_step: usize,
    /// Applied current per cell, discharge positive (A)
    pub current: Vec<f64>,
    pub resistance: Vec<f64>,
    pub voltage: Vec<f64>,
    pub ocv: Vec<f64>,
    /// Setpoint of the previous global step
    pub prev_setpoint: Option<f64>,
}

impl PackState {
    fn new(current: Vec<f64>, resistance: Vec<f64>) -> Self {
        let n = current.len();
        Self {
            global_step: 0,
            current,
            resistance,
            voltage: vec![0.0; n],
            ocv: vec![0.0; n],
            prev_setpoint: None,
        }
    }
}

fn excitation(step_type: StepType, setpoint: f64) -> Excitation {
    match step_type {
        StepType::Current => Excitation::Current(setpoint),
        StepType::Power => Excitation::Power(setpoint),
    }
}

pub struct Orchestrator {
    solver: Box<dyn CircuitSolver>,
    limits: VoltageLimits,
    node_termination: Option<NodeTermination>,
    input_override: Option<InputOverride>,
    progress: Option<Box<dyn FnMut(StepProgress)>>,
}

impl Orchestrator {
    pub fn new(limits: VoltageLimits) -> Self {
        Self {
            solver: Box::new(MnaSolver::default()),
            limits,
            node_termination: None,
            input_override: None,
            progress: None,
        }
    }

    pub fn with_solver(mut self, solver: Box<dyn CircuitSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_node_termination(mut self, check: NodeTermination) -> Self {
        self.node_termination = Some(check);
        self
    }

    /// `update(global_step)` may return new cell inputs; they are applied
    /// just before the cells advance through that step.
    pub fn with_input_override(
        mut self,
        update: impl FnMut(usize) -> Option<CellInputs> + 'static,
    ) -> Self {
        self.input_override = Some(Box::new(update));
        self
    }

    pub fn with_progress(mut self, progress: impl FnMut(StepProgress) + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn limits(&self) -> VoltageLimits {
        self.limits
    }

    fn solve_circuit(&self, netlist: &Netlist, excitation: Excitation) -> SimResult<CircuitSolution> {
        let timer = Timer::start("circuit solve");
        let solution = self.solver.solve(netlist, excitation)?;
        timer.stop_into(&step_timing::CIRCUIT_SOLVE);
        Ok(solution)
    }

    /// Step the pack through every segment of `protocol`.
    pub fn run(
        &mut self,
        netlist: &mut Netlist,
        protocol: &Protocol,
        pool: &mut dyn WorkerPool,
    ) -> SimResult<PackOutput> {
        let n_cells = netlist.n_cells();
        ensure_len("pool cells", n_cells, pool.n_cells())?;
        let names = pool.variable_names().to_vec();
        let find = |name: &str| {
            names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| SimError::MissingVariable { name: name.into() })
        };
        let v_index = find(variables::TERMINAL_VOLTAGE)?;
        let ocv_index = find(variables::OPEN_CIRCUIT_VOLTAGE)?;

        let n_steps = protocol.total_steps();
        let dt = protocol.dt();
        let mut store = OutputStore::new(n_steps, n_cells, netlist.n_nodes(), names.clone());
        step_timing::reset_all();
        let run_timer = Timer::start("pack run");

        // Initial solve; not a protocol step.
        let first = match protocol.first_setpoint() {
            s if s == 0.0 => NEGLIGIBLE_EXCITATION,
            s => s,
        };
        let init = self.solve_circuit(netlist, excitation(protocol.first_step_type(), first))?;
        netlist.set_terminal_value(init.terminal_current)?;
        let seed: Vec<f64> = init.cell_currents.iter().map(|j| -j).collect();
        store.seed(0, &seed, &init.node_voltages);
        let mut state = PackState::new(seed, netlist.internal_resistance());
        let timer = Timer::start("initial evaluate");
        pool.evaluate(&state.current)?;
        let evaluate_s = timer.stop_into(&step_timing::POOL_EVALUATE);
        debug!(n_cells, n_steps, evaluate_s, "Initial circuit solve and evaluate complete");

        let mut terminations = Vec::new();
        for (seg_index, segment) in protocol.segments().iter().enumerate() {
            info!(
                segment = seg_index,
                steps = segment.len(),
                step_type = ?segment.step_type,
                threshold = ?segment.termination,
                "Segment started"
            );
            let seg_timer = Timer::start("segment");
            let seg_start = state.global_step;

            for (k, &setpoint) in segment.setpoints.iter().enumerate() {
                let g = state.global_step;
                let (resting, restarting) = rest_flags(state.prev_setpoint, setpoint);

                let timer = Timer::start("output gather");
                let block = pool.collect_output()?;
                timer.stop_into(&step_timing::OUTPUT_GATHER);
                store.record_variables(g, &block);
                state.voltage.copy_from_slice(block.variable(v_index));
                state.ocv.copy_from_slice(block.variable(ocv_index));

                if !resting && !restarting {
                    let applied = store.cell_current(g);
                    for (c, r) in state.resistance.iter_mut().enumerate() {
                        *r = internal_resistance(state.ocv[c], state.voltage[c], applied[c], *r);
                    }
                }
                store.record_resistance(g, &state.resistance);

                netlist.set_ocv(&state.ocv)?;
                netlist.set_internal_resistance(&state.resistance)?;
                let solution = self.solve_circuit(netlist, excitation(segment.step_type, setpoint))?;
                netlist.set_terminal_value(solution.terminal_current)?;
                for (i, j) in state.current.iter_mut().zip(&solution.cell_currents) {
                    *i = -j;
                }
                store.record_solution(g, g as f64 * dt, &state.current, &solution);

                let reasons = if k == 0 {
                    Vec::new()
                } else {
                    termination_reasons(
                        &state.voltage,
                        self.limits,
                        segment.termination,
                        &solution.node_voltages,
                        self.node_termination.as_ref(),
                    )
                };

                if let Some(inputs) = self.input_override.as_mut().and_then(|update| update(g)) {
                    debug!(global_step = g, inputs = ?inputs.names().collect::<Vec<_>>(), "Cell inputs updated");
                    pool.update_inputs(&inputs)?;
                }

                let timer = Timer::start("pool step");
                let event = pool.step(&state.current)?;
                let step_s = timer.stop_into(&step_timing::POOL_STEP);
                debug!(global_step = g, setpoint, step_s, "Step complete");
                if event {
                    log_events(pool, g)?;
                }

                state.global_step += 1;
                state.prev_setpoint = Some(setpoint);
                if let Some(progress) = self.progress.as_mut() {
                    progress(StepProgress {
                        global_step: state.global_step,
                        total_steps: n_steps,
                        segment: seg_index,
                    });
                }

                if !reasons.is_empty() {
                    warn!(
                        segment = seg_index,
                        step = k,
                        global_step = g,
                        reasons = ?reasons,
                        "Segment terminated early"
                    );
                    terminations.push(TerminationReport {
                        segment: seg_index,
                        step_in_segment: k,
                        global_step: g,
                        reasons,
                    });
                    break;
                }
            }

            let elapsed = seg_timer.elapsed_s();
            let steps = state.global_step - seg_start;
            info!(
                segment = seg_index,
                steps,
                elapsed_s = elapsed,
                per_step_s = elapsed / steps.max(1) as f64,
                "Segment finished"
            );
        }

        let elapsed = run_timer.stop_and_log();
        info!(
            steps = state.global_step,
            total_steps = n_steps,
            elapsed_s = elapsed,
            terminations = terminations.len(),
            "Pack run finished"
        );
        step_timing::log_summary();
        Ok(store.finish(state.global_step, terminations))
    }
}

fn log_events(pool: &mut dyn WorkerPool, global_step: usize) -> SimResult<()> {
    let changes = pool.event_changes()?;
    for (name, flags) in pool.event_names().iter().zip(&changes) {
        let cells: Vec<usize> = flags
            .iter()
            .enumerate()
            .filter_map(|(c, &hit)| hit.then_some(c))
            .collect();
        if !cells.is_empty() {
            warn!(event = %name, global_step, cells = ?cells, "Cell event");
        }
    }
    Ok(())
}
