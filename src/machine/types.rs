//! Type definitions for the abstract machine.
//!
//! This module contains the core types used throughout the machine:
//! - MachineError: errors that can occur during execution
//! - MachineResult: result alias used by every fallible operation
//! - MachineConfig: machine configuration options

use super::word::Word;

/// Result of a machine operation
pub type MachineResult<T> = Result<T, MachineError>;

/// Errors that can occur during machine execution.
///
/// Zone violations are terminal: no protocol operation catches them, and the
/// trampoline propagates them straight out of `Engine::run`. Exhausting the
/// search space is *not* an error; it surfaces as `Outcome::Failure`.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineError {
    /// A zone cursor moved past its hard end
    ZoneOverflow {
        zone: &'static str,
        cursor: usize,
        limit: usize,
    },
    /// A zone cursor moved below its floor
    ZoneUnderflow {
        zone: &'static str,
        cursor: usize,
        floor: usize,
    },
    /// Heap restore to a mark above the current allocation cursor
    BadHeapMark { mark: usize, hp: usize },
    /// Code address outside the program's label table
    InvalidCodeAddr(usize),
    /// General-purpose register index outside r1..rN
    RegisterOutOfRange(usize),
    /// Saved-variable slot outside a choice-point frame's save area
    FrameSlotOutOfRange { frame: usize, slot: usize },
    /// Control reached the do_not_reached builtin label
    NotReached,
    /// A frame pointer that is not a live choice-point frame
    InvalidFrame(usize),
    /// Trail undo target past the current trail cursor
    BadTrailMark { mark: usize, cursor: usize },
    /// load_context on an engine that already has a context loaded
    EngineBusy { loaded: usize },
    /// save_context for a context other than the one loaded
    ContextMismatch { expected: usize, got: usize },
    /// An exception word propagated out of the re-entrant call boundary
    Exception(Word),
}

impl std::fmt::Display for MachineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZoneOverflow { zone, cursor, limit } => {
                write!(f, "{} overflow: cursor {} past limit {}", zone, cursor, limit)
            }
            Self::ZoneUnderflow { zone, cursor, floor } => {
                write!(f, "{} underflow: cursor {} below floor {}", zone, cursor, floor)
            }
            Self::BadHeapMark { mark, hp } => {
                write!(f, "heap restore to mark {} above allocation cursor {}", mark, hp)
            }
            Self::InvalidCodeAddr(addr) => write!(f, "invalid code address: {}", addr),
            Self::RegisterOutOfRange(i) => write!(f, "register out of range: r{}", i),
            Self::FrameSlotOutOfRange { frame, slot } => {
                write!(f, "frame variable {} out of range for frame at {}", slot, frame)
            }
            Self::NotReached => write!(f, "executed do_not_reached"),
            Self::InvalidFrame(fr) => write!(f, "not a live choice-point frame: {}", fr),
            Self::BadTrailMark { mark, cursor } => {
                write!(f, "trail undo to mark {} past cursor {}", mark, cursor)
            }
            Self::EngineBusy { loaded } => {
                write!(f, "engine already runs context {}", loaded)
            }
            Self::ContextMismatch { expected, got } => {
                write!(f, "context mismatch: engine runs {} but was asked to save {}", expected, got)
            }
            Self::Exception(w) => write!(f, "uncaught exception: {:?}", w),
        }
    }
}

impl std::error::Error for MachineError {}

/// Configuration for a machine state and its engines.
///
/// Zone sizes are in words. The heap is growable by default; the stacks are
/// fixed so that overflow is detected rather than absorbed.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Main heap size in words
    pub heap_words: usize,
    /// Solutions heap size in words
    pub solutions_heap_words: usize,
    /// Global heap size in words
    pub global_heap_words: usize,
    /// Deterministic stack size in words
    pub detstack_words: usize,
    /// Choice-point stack size in words
    pub nondet_words: usize,
    /// Whether the heaps may grow past their initial size
    pub heap_growable: bool,
    /// Number of engines (OS threads) in an engine pool
    pub num_engines: usize,
    /// Enable per-transfer execution tracing
    pub trace: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            heap_words: 65536,
            solutions_heap_words: 16384,
            global_heap_words: 16384,
            detstack_words: 16384,
            nondet_words: 4096,
            heap_growable: true,
            num_engines: num_cpus::get().min(4),
            trace: false,
        }
    }
}
