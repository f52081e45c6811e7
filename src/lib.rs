//! Logitron - Abstract Machine Execution Core
//!
//! This library is the execution core of a runtime for a declarative,
//! nondeterministic language: a register-based abstract machine that runs
//! compiled procedures over explicit, programmer-visible stacks instead of
//! the native call stack.
//!
//! # Architecture
//!
//! The machine is built from a small set of components, leaves first:
//!
//! 1. **Tagged words** (`machine::word`)
//!    - 64-bit values whose low bits are a representation tag
//!    - The single home of all tag masking and shifting
//!
//! 2. **Memory zones** (`machine::zone`)
//!    - Bounds-checked, optionally growable regions of words
//!    - High-water marks, fatal overflow/underflow detection
//!
//! 3. **Heap** (`machine::heap`)
//!    - Bump allocation with mark/restore rollback for backtracking
//!
//! 4. **Two stacks** (`machine::detstack`, `machine::nondet`)
//!    - A plain LIFO stack for calls that cannot backtrack
//!    - A choice-point stack of variable-length frames implementing the
//!      mkframe/modframe/succeed/fail/redo protocol
//!
//! 5. **Engine and contexts** (`machine::engine`, `machine::context`,
//!    `machine::sched`)
//!    - An engine owns one live register file and runs the trampoline
//!    - Contexts are suspendable computations multiplexed onto engines
//!
//! 6. **Introspection** (`machine::events`)
//!    - Execution events, ancestor stack walks, and retry, consumed by an
//!      external debugger
//!
//! # Example
//!
//! ```rust
//! use logitron::machine::{Engine, MachineConfig, Outcome, Program, Word};
//!
//! // A procedure that returns 42 in r1, and a caller that runs it.
//! let mut builder = Program::builder();
//! let answer = builder.label("answer", |e| {
//!     e.regs_mut().set_reg(1, Word::from_int(42))?;
//!     Ok(e.proceed())
//! });
//!
//! let mut engine = Engine::new(0, builder.build_arc(), MachineConfig::default()).unwrap();
//! let outcome = engine.run(answer).unwrap();
//! assert_eq!(outcome, Outcome::Success);
//! assert_eq!(engine.regs().reg(1).unwrap().to_int(), 42);
//! ```
//!
//! # Control Flow
//!
//! Generated code is a table of labels; each label returns a `Transfer`
//! telling the engine's trampoline where control goes next. A tailcall is
//! therefore an ordinary returned value and never grows the native stack.
//! Failure is not an error: exhausting the search space surfaces as
//! `Outcome::Failure` through the base choice-point frame.

pub mod machine;

pub use machine::{
    load_context, save_context, Context, Engine, EnginePool, MachineConfig, MachineError,
    MachineResult, Outcome, Program, ProgramBuilder, Transfer, Word,
};
