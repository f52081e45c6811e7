//! Code representation and control transfer.
//!
//! Generated code is a table of labels, each a function from the engine to a
//! `Transfer`. The engine runs a trampoline: it calls the label at the
//! current address, the label returns where control goes next, and the
//! trampoline jumps there. A "goto" is therefore a returned value, never a
//! native call, so tailcalls cannot grow the native stack.
//!
//! Every program carries the builtin labels at fixed addresses: generated
//! code uses them as redo addresses and continuations (a choice point whose
//! retry is "just fail again" installs `DO_FAIL`), and the machine itself
//! anchors the base choice-point frame and the initial success continuation
//! on the two stop labels.

use std::sync::Arc;

use super::engine::Engine;
use super::types::{MachineError, MachineResult};
use super::word::Word;

/// Index into a program's label table
pub type CodeAddr = usize;

/// A label body: one straight-line fragment of generated code
pub type LabelFn = Box<dyn Fn(&mut Engine) -> MachineResult<Transfer> + Send + Sync>;

/// Where control goes after a label body runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Jump to another label; the trampoline continues
    Jump(CodeAddr),
    /// Leave the trampoline with a final outcome
    Stop(Outcome),
}

/// How a run of the machine ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The computation produced a solution
    Success,
    /// The search space is exhausted; a normal outcome, not an error
    Failure,
    /// An exception word escaped to the call boundary
    Exception(Word),
    /// The context yielded cooperatively and can resume at `resume`
    Yielded { resume: CodeAddr },
}

/// Determinism of a procedure, as recorded in its layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Determinism {
    Det,
    Semidet,
    Multi,
    Nondet,
}

/// Static layout of one procedure: what the introspection interface needs to
/// name it, locate it in source, and walk past its frame.
#[derive(Debug, Clone)]
pub struct ProcLayout {
    /// Procedure name as the debugger should print it
    pub name: &'static str,
    /// Source file of the procedure
    pub file: &'static str,
    /// Source line of the procedure
    pub line: u32,
    /// Determinism, which decides which stack its frame lives on
    pub detism: Determinism,
    /// Det stack slots the procedure reserves, or the save-area size of its
    /// choice-point frame
    pub frame_size: usize,
    /// Det stack slot (`sp[-n]`) holding the saved success continuation,
    /// for procedures that save one
    pub succip_slot: Option<usize>,
}

// Builtin label addresses, identical in every program.

/// Executing this label is a protocol violation
pub const DO_NOT_REACHED: CodeAddr = 0;
/// Run the `fail` operation: backtrack to the next alternative
pub const DO_FAIL: CodeAddr = 1;
/// Run the `succeed` operation
pub const DO_SUCCEED: CodeAddr = 2;
/// Run the `redo` operation
pub const DO_REDO: CodeAddr = 3;
/// Stop the trampoline with `Outcome::Failure`; redoip of the base frame
pub const DO_STOP_FAILURE: CodeAddr = 4;
/// Stop the trampoline with `Outcome::Success`; the initial continuation
pub const DO_STOP_SUCCESS: CodeAddr = 5;

/// Number of builtin labels preceding user labels
pub const NUM_BUILTIN_LABELS: usize = 6;

struct Label {
    name: &'static str,
    code: LabelFn,
    layout: Option<Arc<ProcLayout>>,
}

/// An immutable, shareable program: the label table generated code runs from
pub struct Program {
    labels: Vec<Label>,
}

impl Program {
    /// Create a builder with the builtin labels pre-registered
    pub fn builder() -> ProgramBuilder {
        ProgramBuilder::new()
    }

    /// Look up the body of the label at `addr`
    #[inline]
    pub(super) fn label(&self, addr: CodeAddr) -> MachineResult<&LabelFn> {
        self.labels
            .get(addr)
            .map(|l| &l.code)
            .ok_or(MachineError::InvalidCodeAddr(addr))
    }

    /// The name of the label at `addr`
    pub fn name(&self, addr: CodeAddr) -> &'static str {
        self.labels.get(addr).map(|l| l.name).unwrap_or("<invalid>")
    }

    /// The layout of the procedure owning the label at `addr`, if registered
    pub fn layout(&self, addr: CodeAddr) -> Option<&Arc<ProcLayout>> {
        self.labels.get(addr).and_then(|l| l.layout.as_ref())
    }

    /// Number of labels, builtins included
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("labels", &self.labels.iter().map(|l| l.name).collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for constructing programs
pub struct ProgramBuilder {
    labels: Vec<Label>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        let mut builder = Self { labels: Vec::new() };
        builder.push_label("do_not_reached", None, Box::new(|_| Err(MachineError::NotReached)));
        builder.push_label("do_fail", None, Box::new(|e| e.fail()));
        builder.push_label("do_succeed", None, Box::new(|e| e.succeed()));
        builder.push_label("do_redo", None, Box::new(|e| e.redo()));
        builder.push_label(
            "do_stop_failure",
            None,
            Box::new(|_| Ok(Transfer::Stop(Outcome::Failure))),
        );
        builder.push_label(
            "do_stop_success",
            None,
            Box::new(|_| Ok(Transfer::Stop(Outcome::Success))),
        );
        debug_assert_eq!(builder.labels.len(), NUM_BUILTIN_LABELS);
        builder
    }

    fn push_label(
        &mut self,
        name: &'static str,
        layout: Option<Arc<ProcLayout>>,
        code: LabelFn,
    ) -> CodeAddr {
        let addr = self.labels.len();
        self.labels.push(Label { name, code, layout });
        addr
    }

    /// Register a plain label with no layout
    pub fn label<F>(&mut self, name: &'static str, f: F) -> CodeAddr
    where
        F: Fn(&mut Engine) -> MachineResult<Transfer> + Send + Sync + 'static,
    {
        self.push_label(name, None, Box::new(f))
    }

    /// Register a procedure entry label carrying its layout
    pub fn proc_label<F>(&mut self, layout: ProcLayout, f: F) -> CodeAddr
    where
        F: Fn(&mut Engine) -> MachineResult<Transfer> + Send + Sync + 'static,
    {
        let name = layout.name;
        self.push_label(name, Some(Arc::new(layout)), Box::new(f))
    }

    /// Register a continuation label inside an already-registered procedure,
    /// sharing that procedure's layout
    pub fn cont_label<F>(&mut self, name: &'static str, owner: CodeAddr, f: F) -> CodeAddr
    where
        F: Fn(&mut Engine) -> MachineResult<Transfer> + Send + Sync + 'static,
    {
        let layout = self.labels.get(owner).and_then(|l| l.layout.clone());
        self.push_label(name, layout, Box::new(f))
    }

    /// Finish the program and share it
    pub fn build_arc(self) -> Arc<Program> {
        Arc::new(Program { labels: self.labels })
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}
