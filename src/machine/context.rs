//! Contexts: suspendable logical computations.
//!
//! A context owns the complete machine state of one logical computation —
//! register file, heaps, both stacks, trail — so many contexts can
//! time-share a few engines. Loading a context swaps its state with the
//! engine's live state; saving swaps back. The pairing discipline (every
//! load matched by a save on the same engine) means an engine always gets
//! its own embedded state back between contexts, and a context's zones are
//! mutated by exactly one engine at a time.

use tracing::trace;

use super::code::CodeAddr;
use super::engine::{Engine, MachineState};
use super::types::{MachineConfig, MachineError, MachineResult};

/// Identifier of a context within an engine pool
pub type ContextId = usize;

/// A suspended (or not-yet-started) logical computation
#[derive(Debug)]
pub struct Context {
    id: ContextId,
    /// The computation's machine state while suspended; while loaded on an
    /// engine this holds the engine's parked state instead.
    state: MachineState,
    /// Where execution (re)starts when next loaded
    resume: CodeAddr,
}

impl Context {
    /// Create a context that will start at `entry` with fresh zones
    pub fn new(id: ContextId, entry: CodeAddr, config: &MachineConfig) -> MachineResult<Self> {
        Ok(Self {
            id,
            state: MachineState::new(config)?,
            resume: entry,
        })
    }

    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The code address execution resumes at
    #[inline]
    pub fn resume_addr(&self) -> CodeAddr {
        self.resume
    }

    /// Record where the computation resumes after its next load
    pub fn set_resume(&mut self, resume: CodeAddr) {
        self.resume = resume;
    }
}

/// Load `ctx` onto `engine`: the context's saved registers and zones become
/// the engine's live state.
pub fn load_context(engine: &mut Engine, ctx: &mut Context) -> MachineResult<()> {
    if let Some(current) = engine.current_context {
        return Err(MachineError::EngineBusy { loaded: current });
    }
    trace!(target: "logitron::context", engine = engine.id, ctx = ctx.id, "load_context");
    std::mem::swap(&mut engine.state, &mut ctx.state);
    engine.current_context = Some(ctx.id);
    Ok(())
}

/// Save the engine's live state back into `ctx`, suspending it
pub fn save_context(engine: &mut Engine, ctx: &mut Context) -> MachineResult<()> {
    match engine.current_context {
        Some(id) if id == ctx.id => {}
        Some(id) => return Err(MachineError::ContextMismatch { expected: id, got: ctx.id }),
        None => return Err(MachineError::ContextMismatch { expected: usize::MAX, got: ctx.id }),
    }
    trace!(target: "logitron::context", engine = engine.id, ctx = ctx.id, "save_context");
    std::mem::swap(&mut engine.state, &mut ctx.state);
    engine.current_context = None;
    Ok(())
}
