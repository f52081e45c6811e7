//! The abstract machine execution core.
//!
//! A register-based machine for a declarative, nondeterministic language,
//! executing compiled procedures over explicit, programmer-visible stacks.
//! Control flow is a trampoline over code addresses; calls that cannot
//! backtrack use the deterministic stack, calls that can use the
//! choice-point stack and the succeed/fail/redo protocol.
//!
//! This module is organized into submodules by functionality:
//! - `types`: Core type definitions (MachineError, MachineConfig)
//! - `word`: Tagged machine words, the single home of tag arithmetic
//! - `zone`: Bounds-checked word regions with watermarks
//! - `heap`: Bump allocation with mark/restore rollback
//! - `detstack`: The deterministic (non-backtracking) stack
//! - `nondet`: The choice-point stack and backtracking protocol
//! - `trail`: The log of destructive updates undone on backtracking
//! - `code`: Programs, labels, and control transfer values
//! - `regs`: The register file
//! - `engine`: The trampoline, call protocol, and re-entrant boundary
//! - `context`: Suspendable computations multiplexed onto engines
//! - `sched`: The engine pool and cooperative scheduling
//! - `events`: Execution events, stack walks, and retry for the debugger

pub mod code;
pub mod context;
pub mod detstack;
pub mod engine;
pub mod events;
pub mod heap;
pub mod nondet;
pub mod regs;
pub mod sched;
pub mod trail;
pub mod types;
pub mod word;
pub mod zone;

#[cfg(test)]
mod tests;

pub use code::{
    CodeAddr, Determinism, Outcome, ProcLayout, Program, ProgramBuilder, Transfer, DO_FAIL,
    DO_NOT_REACHED, DO_REDO, DO_STOP_FAILURE, DO_STOP_SUCCESS, DO_SUCCEED, NUM_BUILTIN_LABELS,
};
pub use context::{load_context, save_context, Context, ContextId};
pub use detstack::DetStack;
pub use engine::{Engine, MachineState};
pub use events::{
    format_ancestors, AncestorFrame, FrameLoc, Port, StopCondition, TraceControl, TraceEvent,
};
pub use heap::{Heap, HeapMark};
pub use nondet::{NondetStack, NONDET_FIXED_SIZE};
pub use regs::{Registers, NUM_REGS};
pub use sched::EnginePool;
pub use trail::{Trail, TrailLoc};
pub use types::{MachineConfig, MachineError, MachineResult};
pub use word::{make_tagged, tag_of, untag, Tag, Word, TAG_BITS};
pub use zone::MemoryZone;
