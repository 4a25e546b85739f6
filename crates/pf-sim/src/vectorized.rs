//! Single-shard pool that advances cells on a local rayon pool.

use pf_core::timing::Timer;
use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::inputs::CellInputs;
use crate::pool::{OutputBlock, WorkerPool};
use crate::worker::{Executor, ShardWorker, WorkerSetup};

pub struct VectorizedPool {
    worker: ShardWorker,
    variables: Vec<String>,
    input_names: Vec<String>,
}

impl VectorizedPool {
    pub fn setup(n_cells: usize, threads: usize, setup: &WorkerSetup) -> SimResult<Self> {
        if n_cells == 0 {
            return Err(SimError::Setup {
                what: "pack has no cells".into(),
            });
        }
        setup.validate(n_cells)?;
        let timer = Timer::start("vectorized setup");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("pf-cells-{i}"))
            .build()
            .map_err(|e| SimError::Setup {
                what: format!("rayon pool: {e}"),
            })?;
        let worker = ShardWorker::new(0..n_cells, setup, Executor::Rayon(pool))?;
        debug!(n_cells, threads, "Vectorized pool ready");
        timer.stop_and_log();
        Ok(Self {
            worker,
            variables: setup.variables.clone(),
            input_names: setup.model.input_names(),
        })
    }
}

impl WorkerPool for VectorizedPool {
    fn n_cells(&self) -> usize {
        self.worker.n_cells()
    }

    fn variable_names(&self) -> &[String] {
        &self.variables
    }

    fn event_names(&self) -> &[String] {
        self.worker.event_names()
    }

    fn step(&mut self, currents: &[f64]) -> SimResult<bool> {
        self.worker.step(currents)
    }

    fn evaluate(&mut self, currents: &[f64]) -> SimResult<()> {
        self.worker.evaluate(currents)
    }

    fn update_inputs(&mut self, inputs: &CellInputs) -> SimResult<()> {
        inputs.validate(self.n_cells(), &self.input_names)?;
        self.worker.update_inputs(inputs)
    }

    fn collect_output(&mut self) -> SimResult<OutputBlock> {
        let mut block = OutputBlock::new(self.variables.len(), self.n_cells());
        for (v, row) in self.worker.output().iter().enumerate() {
            block.variable_mut(v).copy_from_slice(row);
        }
        Ok(block)
    }

    fn event_changes(&mut self) -> SimResult<Vec<Vec<bool>>> {
        Ok(self.worker.event_change())
    }

    fn shutdown(&mut self) -> SimResult<()> {
        Ok(())
    }
}
