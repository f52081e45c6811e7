//! The engine: one schedulable unit of native execution.
//!
//! An engine is bound to one OS thread and owns exactly one live machine
//! state at a time: the register file, the three heaps, both stacks, and the
//! trail. Generated code runs "on" an engine through the trampoline in
//! `run`: each label returns a `Transfer`, the engine jumps, and no control
//! transfer ever grows the native call stack.
//!
//! `call_boundary` is the re-entrant crossing between native calling code
//! and machine execution. It snapshots the full register file plus the trail
//! cursor and ticket counters; an exceptional unwind restores exactly that
//! snapshot before the caller observes the outcome.

use std::sync::Arc;
use tracing::trace;

use super::code::{CodeAddr, Outcome, Program, Transfer, DO_STOP_SUCCESS};
use super::detstack::DetStack;
use super::events::TraceState;
use super::heap::Heap;
use super::nondet::NondetStack;
use super::regs::Registers;
use super::trail::Trail;
use super::types::{MachineConfig, MachineError, MachineResult};
use super::word::Word;

/// The complete machine state of one logical computation: everything that
/// must move when a context migrates between engines.
#[derive(Debug, Clone)]
pub struct MachineState {
    pub(super) regs: Registers,
    pub(super) heap: Heap,
    pub(super) solutions_heap: Heap,
    pub(super) global_heap: Heap,
    pub(super) detstack: DetStack,
    pub(super) nondet: NondetStack,
    pub(super) trail: Trail,
}

impl MachineState {
    /// Create a fresh machine state: zones allocated, base choice-point
    /// frame laid down, registers pointing at it.
    pub fn new(config: &MachineConfig) -> MachineResult<Self> {
        let mut nondet = NondetStack::new(config.nondet_words);
        let base = nondet.init_base()?;

        let mut regs = Registers::new();
        regs.maxfr = base;
        regs.curfr = base;
        regs.succip = DO_STOP_SUCCESS;

        Ok(Self {
            regs,
            heap: Heap::new("heap", config.heap_words, config.heap_growable),
            solutions_heap: Heap::new("solutions heap", config.solutions_heap_words, config.heap_growable),
            global_heap: Heap::new("global heap", config.global_heap_words, config.heap_growable),
            detstack: DetStack::new(config.detstack_words),
            nondet,
            trail: Trail::new(),
        })
    }
}

/// Snapshot taken at the re-entrant call boundary
#[derive(Debug, Clone)]
struct BoundarySnapshot {
    regs: Registers,
    trail_cursor: usize,
    ticket_counter: u64,
    ticket_high_water: u64,
}

/// A native-thread-bound holder of one live machine state
pub struct Engine {
    pub(super) id: usize,
    pub(super) state: MachineState,
    pub(super) program: Arc<Program>,
    pub(super) config: MachineConfig,
    pub(super) current_context: Option<usize>,
    pub(super) exception: Option<Word>,
    pub(super) trace: TraceState,
}

impl Engine {
    /// Create an engine with its own embedded machine state
    pub fn new(id: usize, program: Arc<Program>, config: MachineConfig) -> MachineResult<Self> {
        let state = MachineState::new(&config)?;
        Ok(Self {
            id,
            state,
            program,
            config,
            current_context: None,
            exception: None,
            trace: TraceState::default(),
        })
    }

    // === Accessors ===

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    #[inline]
    pub fn regs(&self) -> &Registers {
        &self.state.regs
    }

    #[inline]
    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.state.regs
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.state.heap
    }

    #[inline]
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.state.heap
    }

    #[inline]
    pub fn solutions_heap(&self) -> &Heap {
        &self.state.solutions_heap
    }

    #[inline]
    pub fn solutions_heap_mut(&mut self) -> &mut Heap {
        &mut self.state.solutions_heap
    }

    #[inline]
    pub fn global_heap(&self) -> &Heap {
        &self.state.global_heap
    }

    #[inline]
    pub fn global_heap_mut(&mut self) -> &mut Heap {
        &mut self.state.global_heap
    }

    #[inline]
    pub fn nondet(&self) -> &NondetStack {
        &self.state.nondet
    }

    #[inline]
    pub fn detstack(&self) -> &DetStack {
        &self.state.detstack
    }

    #[inline]
    pub fn trail(&self) -> &Trail {
        &self.state.trail
    }

    #[inline]
    pub fn trail_mut(&mut self) -> &mut Trail {
        &mut self.state.trail
    }

    /// The machine state, for introspection (stack walks, register dumps)
    #[inline]
    pub fn machine_state(&self) -> &MachineState {
        &self.state
    }

    /// The exception word most recently thrown on this engine, if any
    #[inline]
    pub fn exception(&self) -> Option<Word> {
        self.exception
    }

    // === Control transfer primitives ===

    /// Record the success continuation and transfer control to `target`
    pub fn call(&mut self, target: CodeAddr, succ_cont: CodeAddr) -> Transfer {
        trace!(target: "logitron::call", to = target, cont = succ_cont, "call");
        self.state.regs.succip = succ_cont;
        Transfer::Jump(target)
    }

    /// Transfer control to `target` without touching `succip`. Last-call
    /// optimization: the callee returns straight to our caller.
    pub fn tailcall(&self, target: CodeAddr) -> Transfer {
        trace!(target: "logitron::call", to = target, "tailcall");
        Transfer::Jump(target)
    }

    /// Ordinary return: transfer control to `succip`
    pub fn proceed(&self) -> Transfer {
        trace!(target: "logitron::call", cont = self.state.regs.succip, "proceed");
        Transfer::Jump(self.state.regs.succip)
    }

    /// Raise an exception: the word lands in the exception register and
    /// unwinds to the nearest call boundary.
    pub fn throw(&mut self, exception: Word) -> Transfer {
        trace!(target: "logitron::engine", ?exception, "throw");
        self.exception = Some(exception);
        Transfer::Stop(Outcome::Exception(exception))
    }

    /// Yield cooperatively. The scheduler saves this context and resumes it
    /// later at `resume`, possibly on a different engine.
    pub fn yield_at(&self, resume: CodeAddr) -> Transfer {
        trace!(target: "logitron::engine", resume, "yield");
        Transfer::Stop(Outcome::Yielded { resume })
    }

    // === Execution ===

    /// Run the trampoline from `entry` until the machine stops.
    ///
    /// Terminal errors (zone violations, protocol misuse) propagate out;
    /// search exhaustion comes back as `Ok(Outcome::Failure)`.
    pub fn run(&mut self, entry: CodeAddr) -> MachineResult<Outcome> {
        let program = Arc::clone(&self.program);
        let mut addr = entry;
        loop {
            if self.config.trace {
                trace!(target: "logitron::goto", addr, label = program.name(addr), "goto");
            }
            match (program.label(addr)?)(self)? {
                Transfer::Jump(next) => addr = next,
                Transfer::Stop(outcome) => {
                    trace!(target: "logitron::engine", ?outcome, "stop");
                    return Ok(outcome);
                }
            }
        }
    }

    /// Cross from native code into machine execution and back.
    ///
    /// The full register file, the trail cursor, and the ticket counters are
    /// snapshotted on entry. A normal stop leaves the machine state as the
    /// computation built it; an exception (or a terminal error) restores the
    /// snapshot atomically with the nonlocal exit, so the caller's state is
    /// exactly what it was before the call. The exception itself is
    /// re-raised as `MachineError::Exception`.
    pub fn call_boundary(&mut self, entry: CodeAddr) -> MachineResult<Outcome> {
        let snapshot = BoundarySnapshot {
            regs: self.state.regs.clone(),
            trail_cursor: self.state.trail.cursor(),
            ticket_counter: self.state.trail.ticket_counter(),
            ticket_high_water: self.state.trail.ticket_high_water(),
        };
        match self.run(entry) {
            Ok(Outcome::Exception(exception)) => {
                self.restore_boundary(snapshot);
                Err(MachineError::Exception(exception))
            }
            Err(error) => {
                self.restore_boundary(snapshot);
                Err(error)
            }
            Ok(outcome) => Ok(outcome),
        }
    }

    fn restore_boundary(&mut self, snapshot: BoundarySnapshot) {
        trace!(target: "logitron::engine", "restore boundary snapshot");
        self.state.detstack.set_sp(snapshot.regs.sp);
        self.state.regs = snapshot.regs;
        self.state.trail.truncate(snapshot.trail_cursor);
        self.state
            .trail
            .restore_counters(snapshot.ticket_counter, snapshot.ticket_high_water);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("current_context", &self.current_context)
            .field("regs", &self.state.regs)
            .finish_non_exhaustive()
    }
}
