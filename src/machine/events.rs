//! Execution events and stack introspection.
//!
//! The debugger is an external collaborator; this module is the data it
//! consumes. Generated code announces designated execution points through
//! `Engine::trace_event`, which numbers the event, maintains the call
//! sequence and depth counters, and re-invokes the installed hook when the
//! current stop condition is met. The hook sees a `TraceEvent`: port, the
//! procedure's static layout, and a snapshot of the register file at that
//! moment.
//!
//! `walk_ancestors` reconstructs the chain of ancestor frames ("N levels
//! up") from the live stacks, using each procedure's layout to step past
//! headerless det frames and the succfr chain to step past choice points.
//! `retry` rewinds to an ancestor choice point and re-enters its procedure
//! from the start, undoing trailed updates on the way.

use std::sync::Arc;

use itertools::Itertools;
use smallvec::SmallVec;
use tracing::trace;

use super::code::{CodeAddr, Determinism, ProcLayout, Transfer, NUM_BUILTIN_LABELS};
use super::engine::Engine;
use super::regs::Registers;
use super::types::{MachineError, MachineResult};

/// Why the event hook fired: the kind of execution point reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    /// Entry to a procedure
    Call,
    /// Successful return from a procedure
    Exit,
    /// Re-entry into a procedure to produce more solutions
    Redo,
    /// A procedure ran out of alternatives
    Fail,
    /// An exception is unwinding through the procedure
    Exception,
    /// Entry to a disjunct
    Disj,
    /// Entry to one arm of a switch
    Switch,
}

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Port::Call => "call",
            Port::Exit => "exit",
            Port::Redo => "redo",
            Port::Fail => "fail",
            Port::Exception => "excp",
            Port::Disj => "disj",
            Port::Switch => "swtc",
        };
        f.write_str(s)
    }
}

/// One execution event, as delivered to the hook
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Global event number, starting at 1
    pub event_number: u64,
    /// Call sequence number of the procedure the event belongs to
    pub call_number: u64,
    /// Call depth at the event
    pub depth: u32,
    /// Execution point classification
    pub port: Port,
    /// Static layout of the procedure, when registered
    pub layout: Option<Arc<ProcLayout>>,
    /// Label the event was announced from
    pub addr: CodeAddr,
    /// Register file at the moment of the event
    pub regs: Registers,
}

/// When the hook should next be re-invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// At the very next event
    AnyEvent,
    /// At the first event whose number is at least this
    EventNumber(u64),
    /// At the next event at exactly this depth
    Depth(u32),
    /// Never: run to completion
    ToCompletion,
}

/// The collaborator-settable resume condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceControl {
    pub condition: StopCondition,
    /// Strict: fire only when the condition is met. Lenient: additionally
    /// fire at Exception and Fail ports on the way.
    pub strict: bool,
}

impl Default for TraceControl {
    fn default() -> Self {
        Self {
            condition: StopCondition::ToCompletion,
            strict: true,
        }
    }
}

/// The hook re-invoked at events; may install a new control for the events
/// that follow.
pub type EventHookFn = Box<dyn FnMut(&TraceEvent) -> Option<TraceControl> + Send>;

/// Per-engine event state
#[derive(Default)]
pub(super) struct TraceState {
    hook: Option<EventHookFn>,
    control: TraceControl,
    event_number: u64,
    call_number: u64,
    depth: u32,
}

/// One step of a stack walk: an ancestor call identified by the label
/// execution will return to and, when registered, its procedure layout.
#[derive(Debug, Clone)]
pub struct AncestorFrame {
    /// Levels above the starting procedure, 1-based
    pub level: usize,
    /// Label identifying the ancestor (its return continuation or entry)
    pub addr: CodeAddr,
    /// The ancestor's layout, carrying name and source position
    pub layout: Option<Arc<ProcLayout>>,
    /// Where the ancestor's frame lives
    pub loc: FrameLoc,
}

/// Location of a walked frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLoc {
    /// Det frame ending at this stack pointer
    Det { sp: usize },
    /// Choice-point frame at this frame pointer
    Nondet { fr: usize },
}

/// Render a walked chain as one line, oldest ancestor last
pub fn format_ancestors(frames: &[AncestorFrame]) -> String {
    frames
        .iter()
        .map(|f| f.layout.as_ref().map(|l| l.name).unwrap_or("<unknown>"))
        .join(" <- ")
}

impl Engine {
    // === Event hook ===

    /// Install the event hook with an initial stop condition
    pub fn set_event_hook(&mut self, hook: EventHookFn, control: TraceControl) {
        self.trace.hook = Some(hook);
        self.trace.control = control;
    }

    /// Remove the event hook
    pub fn clear_event_hook(&mut self) {
        self.trace.hook = None;
        self.trace.control = TraceControl::default();
    }

    /// The current stop condition
    pub fn trace_control(&self) -> TraceControl {
        self.trace.control
    }

    /// Events announced so far on this engine
    pub fn event_number(&self) -> u64 {
        self.trace.event_number
    }

    /// Calls announced so far on this engine
    pub fn call_number(&self) -> u64 {
        self.trace.call_number
    }

    /// Current call depth
    pub fn call_depth(&self) -> u32 {
        self.trace.depth
    }

    /// Announce an execution event from the label at `addr`.
    ///
    /// With no hook installed this is a no-op. Counters advance at every
    /// announced event; the hook runs only when the stop condition is met
    /// (or, leniently, at Exception and Fail ports).
    pub fn trace_event(&mut self, port: Port, addr: CodeAddr) -> MachineResult<()> {
        if self.trace.hook.is_none() {
            return Ok(());
        }
        self.trace.event_number += 1;

        // Call and Redo push the depth before the event reports it; Exit and
        // Fail report at the depth of the call they close, then pop it.
        let depth = match port {
            Port::Call => {
                self.trace.call_number += 1;
                self.trace.depth += 1;
                self.trace.depth
            }
            Port::Redo => {
                self.trace.depth += 1;
                self.trace.depth
            }
            Port::Exit | Port::Fail => {
                let d = self.trace.depth;
                self.trace.depth = self.trace.depth.saturating_sub(1);
                d
            }
            _ => self.trace.depth,
        };

        let met = match self.trace.control.condition {
            StopCondition::AnyEvent => true,
            StopCondition::EventNumber(n) => self.trace.event_number >= n,
            StopCondition::Depth(d) => depth == d,
            StopCondition::ToCompletion => false,
        };
        let lenient_fire =
            !self.trace.control.strict && matches!(port, Port::Exception | Port::Fail);
        if !met && !lenient_fire {
            return Ok(());
        }

        let event = TraceEvent {
            event_number: self.trace.event_number,
            call_number: self.trace.call_number,
            depth,
            port,
            layout: self.program.layout(addr).cloned(),
            addr,
            regs: self.state.regs.clone(),
        };
        trace!(target: "logitron::events", event = event.event_number, port = %port, depth, "hook");

        // The hook must not observe itself installed; take it out for the call.
        if let Some(mut hook) = self.trace.hook.take() {
            if let Some(control) = hook(&event) {
                self.trace.control = control;
            }
            self.trace.hook = Some(hook);
        }
        Ok(())
    }

    /// Resume execution from `from` with a fresh stop condition installed.
    /// The hook is re-invoked when the condition is met.
    pub fn resume_with_condition(
        &mut self,
        from: CodeAddr,
        control: TraceControl,
    ) -> MachineResult<super::code::Outcome> {
        self.trace.control = control;
        self.run(from)
    }

    // === Stack walk ===

    /// Walk up to `levels` ancestors of the procedure described by `layout`,
    /// starting from the live `sp`/`curfr` registers.
    ///
    /// Det frames are stepped past using the layout's frame size and saved-
    /// continuation slot; choice points follow the succfr chain. The walk
    /// stops early at the engine base (a builtin continuation) or when an
    /// ancestor has no registered layout to continue through.
    pub fn walk_ancestors(
        &self,
        layout: &Arc<ProcLayout>,
        levels: usize,
    ) -> MachineResult<SmallVec<[AncestorFrame; 8]>> {
        let mut frames = SmallVec::new();
        let mut current = Arc::clone(layout);
        let mut sp = self.state.regs.sp;
        let mut fr = self.state.regs.curfr;

        for level in 1..=levels {
            let (ret_addr, loc) = match current.detism {
                Determinism::Det | Determinism::Semidet => {
                    let slot = match current.succip_slot {
                        Some(slot) => slot,
                        None => break,
                    };
                    let idx = sp.wrapping_sub(slot);
                    self.state.detstack.zone().check_underflow(idx)?;
                    let ret = self.state.detstack.read_abs(idx)?.bits() as usize;
                    sp = sp.wrapping_sub(current.frame_size);
                    (ret, FrameLoc::Det { sp })
                }
                Determinism::Nondet | Determinism::Multi => {
                    let ret = self.state.nondet.succip(fr)?;
                    fr = self.state.nondet.succfr(fr)?;
                    (ret, FrameLoc::Nondet { fr })
                }
            };

            // A builtin continuation means we reached the engine base.
            if ret_addr < NUM_BUILTIN_LABELS {
                break;
            }

            let layout = self.program.layout(ret_addr).cloned();
            frames.push(AncestorFrame {
                level,
                addr: ret_addr,
                layout: layout.clone(),
                loc,
            });
            match layout {
                Some(l) => current = l,
                None => break,
            }
        }
        Ok(frames)
    }

    // === Retry ===

    /// Rewind to an ancestor choice point and re-enter its procedure from
    /// the start. `trail_mark` is the trail cursor recorded when the
    /// ancestor was entered; updates logged since are undone.
    pub fn retry(&mut self, ancestor_fr: usize, trail_mark: usize) -> MachineResult<Transfer> {
        let min = self.state.nondet.zone().min();
        if ancestor_fr > self.state.regs.maxfr || ancestor_fr <= min {
            return Err(MachineError::InvalidFrame(ancestor_fr));
        }
        let state = &mut self.state;
        state
            .trail
            .undo_to(trail_mark, &mut state.heap, &mut state.detstack)?;
        state.regs.maxfr = ancestor_fr;
        state.regs.curfr = ancestor_fr;
        let entry = state.nondet.frame_name(ancestor_fr)?;
        trace!(target: "logitron::events", fr = ancestor_fr, entry, "retry");
        Ok(Transfer::Jump(entry))
    }
}
