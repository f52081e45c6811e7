//! The engine pool: cooperative scheduling of contexts over engines.
//!
//! A pool owns a small, configurable number of engines, each bound to one OS
//! thread. Contexts queue on a channel; a worker pops one, loads it, runs the
//! trampoline from its resume address, and saves it back. A context that
//! yields goes to the back of the queue and may well resume on a different
//! engine — the save/load pair is what makes migration safe, since a
//! context's zones are only ever mutated while loaded on exactly one engine.
//!
//! There is no preemption and no asynchronous cancellation: a context leaves
//! the pool only through a terminal outcome (success, failure, exception) or
//! a terminal error.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, trace};

use super::code::{CodeAddr, Outcome, Program};
use super::context::{load_context, save_context, Context, ContextId};
use super::engine::Engine;
use super::types::{MachineConfig, MachineResult};

/// A pool of engines sharing one run queue of contexts
pub struct EnginePool {
    config: MachineConfig,
    jobs_tx: Sender<Context>,
    results_rx: Receiver<(ContextId, MachineResult<Outcome>)>,
    shutdown_tx: Sender<()>,
    workers: Vec<JoinHandle<()>>,
    next_id: Mutex<ContextId>,
    spawned: Mutex<usize>,
}

impl EnginePool {
    /// Start `config.num_engines` engines, each on its own OS thread
    pub fn new(program: Arc<Program>, config: MachineConfig) -> Self {
        let (jobs_tx, jobs_rx) = unbounded::<Context>();
        let (results_tx, results_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = unbounded::<()>();

        let num_engines = config.num_engines.max(1);
        let mut workers = Vec::with_capacity(num_engines);
        for id in 0..num_engines {
            let jobs_rx = jobs_rx.clone();
            let requeue = jobs_tx.clone();
            let results_tx = results_tx.clone();
            let shutdown_rx = shutdown_rx.clone();
            let program = Arc::clone(&program);
            let config = config.clone();
            workers.push(thread::spawn(move || {
                worker(id, program, config, jobs_rx, requeue, results_tx, shutdown_rx)
            }));
        }

        Self {
            config,
            jobs_tx,
            results_rx,
            shutdown_tx,
            workers,
            next_id: Mutex::new(0),
            spawned: Mutex::new(0),
        }
    }

    /// Number of engines in the pool
    pub fn num_engines(&self) -> usize {
        self.workers.len()
    }

    /// Create a context starting at `entry` and queue it for execution
    pub fn spawn(&self, entry: CodeAddr) -> MachineResult<ContextId> {
        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        let ctx = Context::new(id, entry, &self.config)?;
        *self.spawned.lock() += 1;
        trace!(target: "logitron::sched", ctx = id, entry, "spawn");
        // The queue lives as long as the pool, so this cannot disconnect.
        let _ = self.jobs_tx.send(ctx);
        Ok(id)
    }

    /// Wait for every spawned context to reach a terminal outcome, then shut
    /// the engines down and return the outcomes.
    pub fn join(self) -> Vec<(ContextId, MachineResult<Outcome>)> {
        let expected = *self.spawned.lock();
        let mut results = Vec::with_capacity(expected);
        for _ in 0..expected {
            match self.results_rx.recv() {
                Ok(result) => results.push(result),
                Err(_) => break,
            }
        }
        for _ in &self.workers {
            let _ = self.shutdown_tx.send(());
        }
        for worker in self.workers {
            let _ = worker.join();
        }
        results
    }
}

fn worker(
    id: usize,
    program: Arc<Program>,
    config: MachineConfig,
    jobs_rx: Receiver<Context>,
    requeue: Sender<Context>,
    results_tx: Sender<(ContextId, MachineResult<Outcome>)>,
    shutdown_rx: Receiver<()>,
) {
    let mut engine = match Engine::new(id, program, config) {
        Ok(engine) => engine,
        Err(e) => {
            error!(target: "logitron::sched", engine = id, error = %e, "engine setup failed");
            return;
        }
    };
    loop {
        select! {
            recv(shutdown_rx) -> _ => break,
            recv(jobs_rx) -> msg => {
                let mut ctx = match msg {
                    Ok(ctx) => ctx,
                    Err(_) => break,
                };
                let ctx_id = ctx.id();
                trace!(target: "logitron::sched", engine = id, ctx = ctx_id, "run context");
                match run_context(&mut engine, &mut ctx) {
                    Ok(Outcome::Yielded { resume }) => {
                        ctx.set_resume(resume);
                        let _ = requeue.send(ctx);
                    }
                    terminal => {
                        let _ = results_tx.send((ctx_id, terminal));
                    }
                }
            }
        }
    }
}

/// Load, run, save. The save runs even when execution errored, so the
/// engine is reusable for the next context.
fn run_context(engine: &mut Engine, ctx: &mut Context) -> MachineResult<Outcome> {
    load_context(engine, ctx)?;
    let result = engine.run(ctx.resume_addr());
    let saved = save_context(engine, ctx);
    let outcome = result?;
    saved?;
    Ok(outcome)
}
