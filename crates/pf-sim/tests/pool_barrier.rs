//! A dispatch must not return before every shard has finished.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use pf_cell::{CellIntegrator, CellModel, CellResult, EcmModel, EcmParams};
use pf_sim::{DistributedPool, Partition, VectorizedPool, WorkerPool, WorkerSetup};

/// Wraps the reference cell, delaying one cell's advance and counting
/// completed advances.
struct SlowCellModel {
    inner: EcmModel,
    slow_cell: usize,
    delay: Duration,
    advanced: Arc<AtomicUsize>,
}

struct SlowCell {
    inner: Box<dyn CellIntegrator>,
    delay: Option<Duration>,
    advanced: Arc<AtomicUsize>,
}

impl CellModel for SlowCellModel {
    fn variable_names(&self) -> Vec<String> {
        self.inner.variable_names()
    }

    fn event_names(&self) -> Vec<String> {
        self.inner.event_names()
    }

    fn voltage_limits(&self) -> (f64, f64) {
        self.inner.voltage_limits()
    }

    fn build(&self, cell: usize, initial_soc: f64) -> CellResult<Box<dyn CellIntegrator>> {
        Ok(Box::new(SlowCell {
            inner: self.inner.build(cell, initial_soc)?,
            delay: (cell == self.slow_cell).then_some(self.delay),
            advanced: Arc::clone(&self.advanced),
        }))
    }
}

impl CellIntegrator for SlowCell {
    fn advance(&mut self, current: f64, dt: f64) -> CellResult<()> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.inner.advance(current, dt)?;
        self.advanced.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn evaluate(&self, current: f64) -> Vec<f64> {
        self.inner.evaluate(current)
    }

    fn events(&self, current: f64) -> Vec<f64> {
        self.inner.events(current)
    }
}

fn slow_setup(n_cells: usize, delay: Duration) -> (WorkerSetup, Arc<AtomicUsize>) {
    let advanced = Arc::new(AtomicUsize::new(0));
    let model = SlowCellModel {
        inner: EcmModel::new(EcmParams::default()).unwrap(),
        slow_cell: n_cells - 1,
        delay,
        advanced: Arc::clone(&advanced),
    };
    (WorkerSetup::new(Arc::new(model), 1.0, &[]), advanced)
}

#[test]
fn distributed_step_waits_for_the_slow_shard() {
    let delay = Duration::from_millis(150);
    let (setup, advanced) = slow_setup(6, delay);
    let mut pool = DistributedPool::setup(Partition::split(6, 3).unwrap(), &setup).unwrap();

    for round in 1..=2 {
        let start = Instant::now();
        pool.step(&[1.0; 6]).unwrap();
        assert!(start.elapsed() >= delay);
        assert_eq!(advanced.load(Ordering::SeqCst), 6 * round);
    }
    pool.shutdown().unwrap();
}

#[test]
fn vectorized_step_waits_for_the_slow_cell() {
    let delay = Duration::from_millis(100);
    let (setup, advanced) = slow_setup(8, delay);
    let mut pool = VectorizedPool::setup(8, 4, &setup).unwrap();

    let start = Instant::now();
    pool.step(&[1.0; 8]).unwrap();
    assert!(start.elapsed() >= delay);
    assert_eq!(advanced.load(Ordering::SeqCst), 8);
}

#[test]
fn outputs_after_a_slow_step_reflect_every_cell() {
    let (setup, _) = slow_setup(4, Duration::from_millis(50));
    let mut pool = DistributedPool::setup(Partition::split(4, 4).unwrap(), &setup).unwrap();
    pool.step(&[2.0; 4]).unwrap();
    let block = pool.collect_output().unwrap();
    let v = block.variable(0);
    assert!(v.iter().all(|&x| (x - v[0]).abs() < 1e-12));
}
