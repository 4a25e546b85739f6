//! End-to-end pack stepping through the orchestrator.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pf_cell::ecm::SERIES_RESISTANCE_INPUT;
use pf_cell::{CellModel, EcmModel, EcmParams, variables};
use pf_circuit::{Netlist, PackLayout, pack_netlist};
use pf_protocol::{Protocol, Segment};
use pf_sim::{
    Backend, CellInputs, DistributedPool, InitialSoc, Orchestrator, PackOutput, Partition, SolveOptions,
    TerminationReason, VectorizedPool, VoltageLimits, WorkerPool, WorkerSetup, solve,
};

const WIDE: VoltageLimits = VoltageLimits {
    lower: 0.0,
    upper: 10.0,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn pack(parallel: usize, series: usize) -> Netlist {
    pack_netlist(&PackLayout {
        parallel,
        series,
        ..PackLayout::default()
    })
    .unwrap()
}

fn varied_model(n_cells: usize) -> Arc<dyn CellModel> {
    let scale = (0..n_cells).map(|c| 0.9 + 0.05 * (c % 4) as f64).collect();
    Arc::new(
        EcmModel::new(EcmParams::default())
            .unwrap()
            .with_capacity_scale(scale)
            .unwrap(),
    )
}

fn setup(model: Arc<dyn CellModel>, dt: f64) -> WorkerSetup {
    WorkerSetup::new(model, dt, &[variables::STATE_OF_CHARGE]).with_initial_soc(InitialSoc::Uniform(0.8))
}

fn cycle() -> Protocol {
    Protocol::new(
        10.0,
        vec![
            Segment::current(vec![4.0; 6], None),
            Segment::current(vec![0.0; 4], None),
            Segment::current(vec![-2.0; 3], None),
            Segment::power(vec![12.0; 3], None),
        ],
    )
    .unwrap()
}

fn run_with(pool: &mut dyn WorkerPool, protocol: &Protocol, limits: VoltageLimits) -> PackOutput {
    let mut netlist = pack(4, 2);
    Orchestrator::new(limits)
        .run(&mut netlist, protocol, pool)
        .unwrap()
}

#[test]
fn vectorized_and_distributed_trajectories_match() {
    init_tracing();
    let protocol = cycle();
    let model = varied_model(8);

    let mut vectorized = VectorizedPool::setup(8, 3, &setup(Arc::clone(&model), 10.0)).unwrap();
    let a = run_with(&mut vectorized, &protocol, WIDE);

    let mut distributed =
        DistributedPool::setup(Partition::split(8, 3).unwrap(), &setup(model, 10.0)).unwrap();
    let b = run_with(&mut distributed, &protocol, WIDE);
    distributed.shutdown().unwrap();

    assert_eq!(a.steps_completed, protocol.total_steps());
    assert_eq!(a, b);
}

#[test]
fn output_layout_and_labels() {
    let protocol = cycle();
    let mut pool = VectorizedPool::setup(8, 2, &setup(varied_model(8), 10.0)).unwrap();
    let out = run_with(&mut pool, &protocol, WIDE);

    let n = protocol.total_steps();
    assert_eq!(out.times.len(), n);
    assert_eq!(out.times[3], 30.0);
    assert_eq!(out.cell_current.len(), n);
    assert_eq!(out.n_cells(), 8);
    assert_eq!(out.node_voltages[0].len(), pack(4, 2).n_nodes());
    assert_eq!(
        out.variable_names().collect::<Vec<_>>(),
        vec![
            variables::TERMINAL_VOLTAGE,
            variables::OPEN_CIRCUIT_VOLTAGE,
            variables::STATE_OF_CHARGE
        ]
    );
    assert!(!out.terminated_early());

    // Cell currents sum to the pack current in each parallel group.
    for g in 0..6 {
        let group: f64 = out.cell_current[g][..4].iter().sum();
        assert!((group - 4.0).abs() < 1e-9, "step {g}: {group}");
        assert!((out.pack_current[g] - 4.0).abs() < 1e-12);
    }
    // Power setpoints are met at the terminal.
    for g in n - 3..n {
        assert!((out.pack_power[g] - 12.0).abs() < 1e-6);
    }
    // Internal resistance never drops to zero or below.
    assert!(out.internal_resistance.iter().flatten().all(|&r| r > 0.0));
}

#[test]
fn resting_keeps_the_previous_resistance() {
    let protocol = Protocol::new(
        10.0,
        vec![
            Segment::current(vec![4.0; 3], None),
            Segment::current(vec![0.0; 3], None),
        ],
    )
    .unwrap();
    let mut pool = VectorizedPool::setup(4, 1, &setup(varied_model(4), 10.0)).unwrap();
    let mut netlist = pack(4, 1);
    let out = Orchestrator::new(WIDE)
        .run(&mut netlist, &protocol, &mut pool)
        .unwrap();

    // Step 3 opens the rest segment and is recomputed; 4 and 5 are resting.
    assert_eq!(out.internal_resistance[4], out.internal_resistance[3]);
    assert_eq!(out.internal_resistance[5], out.internal_resistance[3]);
    assert!((out.pack_current[4]).abs() < 1e-12);
}

#[test]
fn restarting_after_a_rest_segment_keeps_the_resistance() {
    let protocol = Protocol::new(
        10.0,
        vec![
            Segment::current(vec![5.0; 3], None),
            Segment::current(vec![0.0; 2], None),
            Segment::current(vec![5.0; 3], None),
        ],
    )
    .unwrap();
    let mut pool = VectorizedPool::setup(2, 1, &setup(varied_model(2), 10.0)).unwrap();
    let mut netlist = pack(1, 2);
    let out = Orchestrator::new(WIDE)
        .run(&mut netlist, &protocol, &mut pool)
        .unwrap();

    assert_eq!(out.steps_completed, 8);
    // Step 4 rests, step 5 restarts; neither recomputes from a zero current.
    assert_eq!(out.internal_resistance[4], out.internal_resistance[3]);
    assert_eq!(out.internal_resistance[5], out.internal_resistance[4]);
    assert!(out.internal_resistance.iter().flatten().all(|&r| r > 0.0 && r < 1.0));
    for (g, v) in out.pack_voltage.iter().enumerate() {
        assert!(v.is_finite() && *v > 5.0 && *v < 9.0, "step {g}: {v}");
    }
    assert!((out.pack_current[5] - 5.0).abs() < 1e-12);
}

#[test]
fn terminal_source_holds_the_last_solved_current() {
    let protocol = cycle();
    let mut pool = VectorizedPool::setup(8, 1, &setup(varied_model(8), 10.0)).unwrap();
    let mut netlist = pack(4, 2);
    let out = Orchestrator::new(WIDE)
        .run(&mut netlist, &protocol, &mut pool)
        .unwrap();

    let last = *out.pack_current.last().unwrap();
    assert!(last > 0.0);
    assert_eq!(netlist.terminal().value, last);
}

#[test]
fn input_override_changes_the_resistance_from_the_next_step() {
    let protocol = Protocol::new(10.0, vec![Segment::current(vec![4.0; 6], None)]).unwrap();
    let model = Arc::new(EcmModel::new(EcmParams::default()).unwrap());
    let mut pool = VectorizedPool::setup(1, 1, &setup(model, 10.0)).unwrap();
    let mut netlist = pack(1, 1);
    let out = Orchestrator::new(WIDE)
        .with_input_override(|g| {
            (g == 3).then(|| CellInputs::new().uniform(SERIES_RESISTANCE_INPUT, 0.05, 1))
        })
        .run(&mut netlist, &protocol, &mut pool)
        .unwrap();

    let r: Vec<f64> = out.internal_resistance.iter().map(|row| row[0]).collect();
    // The RC branch adds under 2 mOhm between consecutive steps.
    assert!((r[3] - r[2]).abs() < 0.005);
    assert!((r[4] - r[3] - 0.03).abs() < 0.005, "{r:?}");
    assert!((r[5] - r[4]).abs() < 0.005);
}

#[test]
fn solve_applies_cell_inputs_on_either_backend() {
    let protocol = Protocol::new(10.0, vec![Segment::current(vec![4.0; 4], None)]).unwrap();
    let run = |backend| {
        let mut netlist = pack(2, 1);
        solve(
            &mut netlist,
            &protocol,
            Arc::new(EcmModel::new(EcmParams::default()).unwrap()),
            SolveOptions {
                backend,
                inputs: CellInputs::new().with(SERIES_RESISTANCE_INPUT, vec![0.02, 0.08]),
                voltage_limits: Some(WIDE),
                ..SolveOptions::default()
            },
        )
        .unwrap()
    };
    let a = run(Backend::Vectorized { threads: 2 });
    let b = run(Backend::Distributed { workers: 2 });
    assert_eq!(a, b);
    // The low-resistance cell carries more of the load.
    assert!(a.cell_current[2][0] > a.cell_current[2][1] + 0.5);
    assert!((a.cell_current[2][0] + a.cell_current[2][1] - 4.0).abs() < 1e-9);

    let mut netlist = pack(2, 1);
    let unknown = solve(
        &mut netlist,
        &protocol,
        Arc::new(EcmModel::new(EcmParams::default()).unwrap()),
        SolveOptions {
            inputs: CellInputs::new().uniform("Ambient temperature [K]", 298.0, 2),
            ..SolveOptions::default()
        },
    );
    assert!(unknown.is_err());
}

#[test]
fn cell_events_are_logged_without_stopping_the_run() {
    init_tracing();
    let protocol = Protocol::new(10.0, vec![Segment::current(vec![10.0; 4], None)]).unwrap();
    let model = Arc::new(EcmModel::new(EcmParams::default()).unwrap());
    let s = setup(model, 10.0).with_initial_soc(InitialSoc::PerCell(vec![0.8, 0.01]));
    let mut pool = DistributedPool::setup(Partition::split(2, 2).unwrap(), &s).unwrap();
    let mut netlist = pack(1, 2);
    let out = Orchestrator::new(WIDE)
        .run(&mut netlist, &protocol, &mut pool)
        .unwrap();
    pool.shutdown().unwrap();

    assert_eq!(out.steps_completed, 4);
    assert!(!out.terminated_early());
    let soc = out.variable(variables::STATE_OF_CHARGE).unwrap();
    assert!(soc[3][1] < 0.0);
    assert!(soc[3][0] > 0.7);
}

#[test]
fn node_check_stops_segment_after_the_firing_step() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let protocol = Protocol::new(
        1.0,
        vec![
            Segment::current(vec![2.0; 10], None),
            Segment::current(vec![1.0; 2], None),
        ],
    )
    .unwrap();
    let mut pool = VectorizedPool::setup(4, 1, &setup(varied_model(4), 1.0)).unwrap();
    let mut netlist = pack(4, 1);
    let out = Orchestrator::new(WIDE)
        .with_node_termination(Box::new(move |_nodes: &[f64]| seen.fetch_add(1, Ordering::SeqCst) == 2))
        .run(&mut netlist, &protocol, &mut pool)
        .unwrap();

    // Checked at k = 1, 2, 3; fires at k = 3, so the segment keeps k + 1 steps.
    assert_eq!(out.terminations.len(), 1);
    let report = &out.terminations[0];
    assert_eq!(report.segment, 0);
    assert_eq!(report.step_in_segment, 3);
    assert_eq!(report.global_step, 3);
    assert_eq!(report.reasons, vec![TerminationReason::NodeVoltage]);
    assert_eq!(out.steps_completed, 4 + 2);
    assert_eq!(out.times.len(), 6);
    assert!((out.pack_current[4] - 1.0).abs() < 1e-12);
}

#[test]
fn first_setpoint_of_a_segment_is_never_checked() {
    let protocol = Protocol::new(
        1.0,
        vec![
            Segment::current(vec![1.0; 5], None),
            Segment::current(vec![1.0], None),
        ],
    )
    .unwrap();
    let mut pool = VectorizedPool::setup(2, 1, &setup(varied_model(2), 1.0)).unwrap();
    let mut netlist = pack(2, 1);
    let out = Orchestrator::new(VoltageLimits::new(9.0, 10.0))
        .run(&mut netlist, &protocol, &mut pool)
        .unwrap();

    assert_eq!(out.terminations.len(), 1);
    assert!(matches!(
        out.terminations[0].reasons[0],
        TerminationReason::LowerCutoff { .. }
    ));
    assert_eq!(out.terminations[0].step_in_segment, 1);
    assert_eq!(out.steps_completed, 2 + 1);
}

#[test]
fn threshold_crossing_ends_a_discharge() {
    let protocol = Protocol::new(
        60.0,
        vec![Segment::current(vec![20.0; 200], Some(3.4))],
    )
    .unwrap();
    let mut pool = VectorizedPool::setup(4, 2, &setup(varied_model(4), 60.0)).unwrap();
    let mut netlist = pack(4, 1);
    let out = Orchestrator::new(WIDE)
        .run(&mut netlist, &protocol, &mut pool)
        .unwrap();

    assert!(out.terminated_early());
    assert!(out.steps_completed < 200);
    let last = out.variable(variables::TERMINAL_VOLTAGE).unwrap()[out.steps_completed - 1].clone();
    assert!(last.iter().any(|&v| v < 3.4) && last.iter().any(|&v| v > 3.4));
}

#[test]
fn progress_reports_every_step() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let protocol = cycle();
    let mut pool = VectorizedPool::setup(8, 1, &setup(varied_model(8), 10.0)).unwrap();
    let mut netlist = pack(4, 2);
    Orchestrator::new(WIDE)
        .with_progress(move |p| sink.borrow_mut().push(p))
        .run(&mut netlist, &protocol, &mut pool)
        .unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), protocol.total_steps());
    assert_eq!(seen[0].global_step, 1);
    assert_eq!(seen.last().unwrap().global_step, protocol.total_steps());
    assert_eq!(seen.last().unwrap().segment, 3);
}

#[test]
fn solve_runs_either_backend() {
    init_tracing();
    let protocol = cycle();
    let run = |backend| {
        let mut netlist = pack(4, 2);
        solve(
            &mut netlist,
            &protocol,
            varied_model(8),
            SolveOptions {
                backend,
                output_variables: vec![variables::STATE_OF_CHARGE.into()],
                initial_soc: InitialSoc::Uniform(0.8),
                voltage_limits: Some(WIDE),
                ..SolveOptions::default()
            },
        )
        .unwrap()
    };
    let a = run(Backend::Vectorized { threads: 2 });
    let b = run(Backend::Distributed { workers: 4 });
    assert_eq!(a, b);

    let soc = a.variable(variables::STATE_OF_CHARGE).unwrap();
    assert!(soc[5].iter().all(|&s| s < 0.8));
}

#[test]
fn zero_first_setpoint_still_seeds_the_run() {
    let protocol = Protocol::new(1.0, vec![Segment::current(vec![0.0; 3], None)]).unwrap();
    let mut pool = VectorizedPool::setup(2, 1, &setup(varied_model(2), 1.0)).unwrap();
    let mut netlist = pack(2, 1);
    let out = Orchestrator::new(WIDE)
        .run(&mut netlist, &protocol, &mut pool)
        .unwrap();
    assert_eq!(out.steps_completed, 3);
    assert!(out.pack_current.iter().all(|&i| i == 0.0));
}

#[test]
fn mismatched_pool_is_rejected() {
    let protocol = cycle();
    let mut pool = VectorizedPool::setup(3, 1, &setup(varied_model(3), 10.0)).unwrap();
    let mut netlist = pack(4, 1);
    assert!(
        Orchestrator::new(WIDE)
            .run(&mut netlist, &protocol, &mut pool)
            .is_err()
    );
}
