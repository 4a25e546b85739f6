//! Multi-shard pool with one OS thread per shard.
//!
//! The orchestrator talks to each shard only through messages: a request
//! channel per shard and a one-shot reply channel per request. A dispatch
//! sends every request first and then waits on every reply.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use pf_core::timing::Timer;
use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::inputs::CellInputs;
use crate::partition::Partition;
use crate::pool::{OutputBlock, WorkerPool};
use crate::worker::{Executor, ShardWorker, WorkerSetup};

enum ShardRequest {
    Step {
        currents: Vec<f64>,
        reply: Sender<SimResult<bool>>,
    },
    Evaluate {
        currents: Vec<f64>,
        reply: Sender<SimResult<()>>,
    },
    UpdateInputs {
        inputs: CellInputs,
        reply: Sender<SimResult<()>>,
    },
    Output {
        reply: Sender<Vec<Vec<f64>>>,
    },
    EventChange {
        reply: Sender<Vec<Vec<bool>>>,
    },
}

/// A reply that has not arrived yet.
struct Pending<T> {
    shard: usize,
    rx: Receiver<T>,
}

impl<T> Pending<T> {
    fn wait(self) -> SimResult<T> {
        self.rx
            .recv()
            .map_err(|_| SimError::WorkerDisconnected { shard: self.shard })
    }
}

struct ShardHandle {
    tx: Option<Sender<ShardRequest>>,
    thread: Option<JoinHandle<()>>,
}

fn run_shard(mut worker: ShardWorker, rx: Receiver<ShardRequest>) {
    // Exits once the pool drops its sender.
    while let Ok(request) = rx.recv() {
        match request {
            ShardRequest::Step { currents, reply } => {
                let _ = reply.send(worker.step(&currents));
            }
            ShardRequest::Evaluate { currents, reply } => {
                let _ = reply.send(worker.evaluate(&currents));
            }
            ShardRequest::UpdateInputs { inputs, reply } => {
                let _ = reply.send(worker.update_inputs(&inputs));
            }
            ShardRequest::Output { reply } => {
                let _ = reply.send(worker.output().to_vec());
            }
            ShardRequest::EventChange { reply } => {
                let _ = reply.send(worker.event_change());
            }
        }
    }
}

pub struct DistributedPool {
    partition: Partition,
    shards: Vec<ShardHandle>,
    variables: Vec<String>,
    event_names: Vec<String>,
    input_names: Vec<String>,
}

impl DistributedPool {
    pub fn setup(partition: Partition, setup: &WorkerSetup) -> SimResult<Self> {
        setup.validate(partition.n_cells())?;
        let timer = Timer::start("distributed setup");

        let mut shards = Vec::with_capacity(partition.n_workers());
        let mut ready = Vec::with_capacity(partition.n_workers());
        let mut failure = None;
        for (shard, range) in partition.ranges().iter().cloned().enumerate() {
            let (tx, rx) = unbounded::<ShardRequest>();
            let (ready_tx, ready_rx) = bounded::<SimResult<Vec<String>>>(1);
            let setup = setup.clone();
            let spawned = thread::Builder::new()
                .name(format!("pf-shard-{shard}"))
                .spawn(move || match ShardWorker::new(range, &setup, Executor::Serial) {
                    Ok(worker) => {
                        let _ = ready_tx.send(Ok(worker.event_names().to_vec()));
                        run_shard(worker, rx);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                });
            match spawned {
                Ok(handle) => {
                    shards.push(ShardHandle {
                        tx: Some(tx),
                        thread: Some(handle),
                    });
                    ready.push(Pending { shard, rx: ready_rx });
                }
                Err(e) => {
                    failure = Some(SimError::Setup {
                        what: format!("spawning shard {shard}: {e}"),
                    });
                    break;
                }
            }
        }

        let mut event_names = Vec::new();
        for pending in ready {
            let shard = pending.shard;
            match pending.wait().and_then(|r| r) {
                Ok(names) => event_names = names,
                Err(e) => {
                    failure.get_or_insert(SimError::Setup {
                        what: format!("shard {shard}: {e}"),
                    });
                }
            }
        }

        let mut pool = Self {
            partition,
            shards,
            variables: setup.variables.clone(),
            event_names,
            input_names: setup.model.input_names(),
        };
        if let Some(e) = failure {
            let _ = pool.shutdown();
            return Err(e);
        }
        debug!(
            n_cells = pool.partition.n_cells(),
            shards = pool.partition.n_workers(),
            "Distributed pool ready"
        );
        timer.stop_and_log();
        Ok(pool)
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Send one request to every shard, then wait on every reply in order.
    fn dispatch<T>(
        &self,
        request: impl Fn(usize, Sender<T>) -> ShardRequest,
    ) -> SimResult<Vec<T>> {
        let mut pending = Vec::with_capacity(self.shards.len());
        for (shard, handle) in self.shards.iter().enumerate() {
            let tx = handle
                .tx
                .as_ref()
                .ok_or(SimError::WorkerDisconnected { shard })?;
            let (reply, rx) = bounded(1);
            tx.send(request(shard, reply))
                .map_err(|_| SimError::WorkerDisconnected { shard })?;
            pending.push(Pending { shard, rx });
        }
        let mut replies = Vec::with_capacity(pending.len());
        let mut first_err = None;
        for p in pending {
            match p.wait() {
                Ok(r) => replies.push(r),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(replies),
        }
    }
}

impl WorkerPool for DistributedPool {
    fn n_cells(&self) -> usize {
        self.partition.n_cells()
    }

    fn variable_names(&self) -> &[String] {
        &self.variables
    }

    fn event_names(&self) -> &[String] {
        &self.event_names
    }

    fn step(&mut self, currents: &[f64]) -> SimResult<bool> {
        pf_core::error::ensure_len("pool currents", self.n_cells(), currents.len())?;
        let partition = &self.partition;
        let replies = self.dispatch(|shard, reply| ShardRequest::Step {
            currents: partition.slice(shard, currents).to_vec(),
            reply,
        })?;
        let mut fired = false;
        for r in replies {
            fired |= r?;
        }
        Ok(fired)
    }

    fn evaluate(&mut self, currents: &[f64]) -> SimResult<()> {
        pf_core::error::ensure_len("pool currents", self.n_cells(), currents.len())?;
        let partition = &self.partition;
        let replies = self.dispatch(|shard, reply| ShardRequest::Evaluate {
            currents: partition.slice(shard, currents).to_vec(),
            reply,
        })?;
        replies.into_iter().collect()
    }

    fn update_inputs(&mut self, inputs: &CellInputs) -> SimResult<()> {
        inputs.validate(self.n_cells(), &self.input_names)?;
        let parts = (0..self.partition.n_workers())
            .map(|shard| inputs.slice(self.partition.range(shard)))
            .collect::<SimResult<Vec<_>>>()?;
        let replies = self.dispatch(|shard, reply| ShardRequest::UpdateInputs {
            inputs: parts[shard].clone(),
            reply,
        })?;
        replies.into_iter().collect()
    }

    fn collect_output(&mut self) -> SimResult<OutputBlock> {
        let replies = self.dispatch(|_, reply| ShardRequest::Output { reply })?;
        let mut block = OutputBlock::new(self.variables.len(), self.n_cells());
        for (shard, rows) in replies.iter().enumerate() {
            for (v, row) in rows.iter().enumerate() {
                self.partition.scatter(shard, row, block.variable_mut(v));
            }
        }
        Ok(block)
    }

    fn event_changes(&mut self) -> SimResult<Vec<Vec<bool>>> {
        let replies = self.dispatch(|_, reply| ShardRequest::EventChange { reply })?;
        let mut changes = vec![vec![false; self.n_cells()]; self.event_names.len()];
        for (shard, rows) in replies.iter().enumerate() {
            for (global, local) in changes.iter_mut().zip(rows) {
                self.partition.scatter(shard, local, global);
            }
        }
        Ok(changes)
    }

    fn shutdown(&mut self) -> SimResult<()> {
        for handle in &mut self.shards {
            handle.tx.take();
        }
        let mut result = Ok(());
        for (shard, handle) in self.shards.iter_mut().enumerate() {
            if let Some(thread) = handle.thread.take() {
                if thread.join().is_err() && result.is_ok() {
                    result = Err(SimError::WorkerPanicked { shard });
                }
            }
        }
        result
    }
}

impl Drop for DistributedPool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
