//! The choice-point (nondet) stack and the backtracking protocol.
//!
//! Each frame records enough state to resume an untried alternative: a fixed
//! header plus a variable-length save area. With `fr` the index of a frame's
//! top word, the header lives at negative offsets from `fr`:
//!
//! ```text
//!   fr - 0 : redoip   code address to resume on failure
//!   fr - 1 : prevfr   frame that was maxfr when this one was created
//!   fr - 2 : succip   return address for success
//!   fr - 3 : succfr   frame to make current on success
//!   fr - 4 : frname   entry label of the procedure that made the frame
//! ```
//!
//! Saved variable `k` sits at `fr - (NONDET_FIXED_SIZE + k)`. A frame spans
//! `prevfr + 1 ..= fr`, so frame sizes are recoverable from the chain alone.
//!
//! Two registers drive the protocol. `maxfr` always points at the most
//! recently created frame; it grows only in `mkframe` and shrinks only in
//! `fail` and `succeed_discard`, always to the recorded `prevfr`. `curfr`
//! points at the frame whose context the executing code runs in; the two
//! coincide exactly when no deterministic calls have happened since the
//! newest choice point was created.
//!
//! The base frame laid down at machine setup keeps the chain grounded: its
//! redoip stops the engine with `Outcome::Failure`, which is how "no more
//! alternatives anywhere" surfaces as a normal outcome. Failing past the base
//! frame is protocol misuse and dies as a zone underflow.

use tracing::trace;

use super::code::{CodeAddr, Transfer, DO_NOT_REACHED, DO_STOP_FAILURE, DO_STOP_SUCCESS};
use super::engine::Engine;
use super::types::{MachineError, MachineResult};
use super::word::Word;
use super::zone::MemoryZone;

// Header slot offsets from a frame's top word.
const REDOIP: usize = 0;
const PREVFR: usize = 1;
const SUCCIP: usize = 2;
const SUCCFR: usize = 3;
const FRNAME: usize = 4;

/// Header words in every choice-point frame
pub const NONDET_FIXED_SIZE: usize = 5;

/// The choice-point stack
#[derive(Debug, Clone)]
pub struct NondetStack {
    zone: MemoryZone,
}

impl NondetStack {
    /// Create a choice-point stack of `size` words
    pub fn new(size: usize) -> Self {
        Self {
            zone: MemoryZone::new("nondstack", size),
        }
    }

    /// Lay down the base frame and raise the zone floor to it.
    /// Returns the base frame pointer.
    pub(super) fn init_base(&mut self) -> MachineResult<usize> {
        let base = NONDET_FIXED_SIZE - 1;
        self.set_redoip(base, DO_STOP_FAILURE)?;
        self.zone.write(base - PREVFR, Word::from_bits(0))?;
        self.set_succip(base, DO_STOP_SUCCESS)?;
        self.zone.write(base - SUCCFR, Word::from_bits(base as u64))?;
        self.zone.write(base - FRNAME, Word::from_bits(DO_NOT_REACHED as u64))?;
        self.zone.set_min(base);
        self.zone.check_overflow(base + 1)?;
        Ok(base)
    }

    /// The underlying zone
    #[inline]
    pub fn zone(&self) -> &MemoryZone {
        &self.zone
    }

    #[inline]
    pub(super) fn zone_mut(&mut self) -> &mut MemoryZone {
        &mut self.zone
    }

    // === Frame header accessors ===

    #[inline]
    pub fn redoip(&self, fr: usize) -> MachineResult<CodeAddr> {
        Ok(self.zone.read(fr - REDOIP)?.bits() as usize)
    }

    #[inline]
    pub(super) fn set_redoip(&mut self, fr: usize, addr: CodeAddr) -> MachineResult<()> {
        self.zone.write(fr - REDOIP, Word::from_bits(addr as u64))
    }

    #[inline]
    pub fn prevfr(&self, fr: usize) -> MachineResult<usize> {
        Ok(self.zone.read(fr - PREVFR)?.bits() as usize)
    }

    #[inline]
    pub fn succip(&self, fr: usize) -> MachineResult<CodeAddr> {
        Ok(self.zone.read(fr - SUCCIP)?.bits() as usize)
    }

    #[inline]
    pub(super) fn set_succip(&mut self, fr: usize, addr: CodeAddr) -> MachineResult<()> {
        self.zone.write(fr - SUCCIP, Word::from_bits(addr as u64))
    }

    #[inline]
    pub fn succfr(&self, fr: usize) -> MachineResult<usize> {
        Ok(self.zone.read(fr - SUCCFR)?.bits() as usize)
    }

    /// Entry label of the procedure that created the frame
    #[inline]
    pub fn frame_name(&self, fr: usize) -> MachineResult<CodeAddr> {
        Ok(self.zone.read(fr - FRNAME)?.bits() as usize)
    }

    // === Save area accessors ===

    fn framevar_index(&self, fr: usize, k: usize) -> MachineResult<usize> {
        let idx = fr.wrapping_sub(NONDET_FIXED_SIZE + k);
        // The frame spans prevfr+1..=fr; anything below is another frame.
        if idx <= self.prevfr(fr)? || idx > fr {
            return Err(MachineError::FrameSlotOutOfRange { frame: fr, slot: k });
        }
        Ok(idx)
    }

    /// Read saved variable `k` of the frame at `fr`
    pub fn framevar(&self, fr: usize, k: usize) -> MachineResult<Word> {
        let idx = self.framevar_index(fr, k)?;
        self.zone.read(idx)
    }

    /// Write saved variable `k` of the frame at `fr`
    pub fn set_framevar(&mut self, fr: usize, k: usize, word: Word) -> MachineResult<()> {
        let idx = self.framevar_index(fr, k)?;
        self.zone.write(idx, word)
    }
}

impl Engine {
    // === Choice-point protocol ===

    /// Push a new choice-point frame with `nvars` save slots and one known
    /// alternative at `redoip`. The new frame becomes both `maxfr` and
    /// `curfr`; the caller's `succip` is captured for `succeed`.
    ///
    /// `entry` is the creating procedure's entry label, recorded in the
    /// frame-name slot for the stack walk and `retry`.
    pub fn mkframe(&mut self, entry: CodeAddr, nvars: usize, redoip: CodeAddr) -> MachineResult<()> {
        let prevfr = self.state.regs.maxfr;
        let succfr = self.state.regs.curfr;
        let succip = self.state.regs.succip;
        let newfr = prevfr + NONDET_FIXED_SIZE + nvars;

        let nd = &mut self.state.nondet;
        nd.set_redoip(newfr, redoip)?;
        nd.zone_mut().write(newfr - PREVFR, Word::from_bits(prevfr as u64))?;
        nd.set_succip(newfr, succip)?;
        nd.zone_mut().write(newfr - SUCCFR, Word::from_bits(succfr as u64))?;
        nd.zone_mut().write(newfr - FRNAME, Word::from_bits(entry as u64))?;

        self.state.regs.maxfr = newfr;
        self.state.regs.curfr = newfr;
        self.state.nondet.zone_mut().check_overflow(newfr + 1)?;
        trace!(target: "logitron::nondet", fr = newfr, prevfr, nvars, redoip, "mkframe");
        Ok(())
    }

    /// Overwrite the current frame's redoip: the next clause of a
    /// multi-clause procedure changes what "retry" means without paying for
    /// a new frame.
    pub fn modframe(&mut self, redoip: CodeAddr) -> MachineResult<()> {
        let curfr = self.state.regs.curfr;
        self.state.nondet.set_redoip(curfr, redoip)?;
        trace!(target: "logitron::nondet", fr = curfr, redoip, "modframe");
        Ok(())
    }

    /// Return a solution while keeping the frame for later retries: control
    /// goes to the frame's saved continuation, `curfr` reverts to the
    /// caller's frame, and `maxfr` stays put so `fail` can come back here.
    pub fn succeed(&mut self) -> MachineResult<Transfer> {
        let childfr = self.state.regs.curfr;
        let succfr = self.state.nondet.succfr(childfr)?;
        let succip = self.state.nondet.succip(childfr)?;
        self.state.regs.curfr = succfr;
        trace!(target: "logitron::nondet", childfr, succfr, succip, "succeed");
        Ok(Transfer::Jump(succip))
    }

    /// Return the last solution: like `succeed`, but also pop the frame by
    /// lowering `maxfr` to its recorded `prevfr`.
    pub fn succeed_discard(&mut self) -> MachineResult<Transfer> {
        let childfr = self.state.regs.curfr;
        let prevfr = self.state.nondet.prevfr(childfr)?;
        let succfr = self.state.nondet.succfr(childfr)?;
        let succip = self.state.nondet.succip(childfr)?;
        self.state.regs.maxfr = prevfr;
        self.state.regs.curfr = succfr;
        trace!(target: "logitron::nondet", childfr, prevfr, succfr, "succeed_discard");
        Ok(Transfer::Jump(succip))
    }

    /// The current alternative is exhausted: pop the current frame and
    /// resume at the redoip of the frame now exposed on top. Reaching the
    /// base frame stops the engine with `Outcome::Failure`; going below it
    /// is fatal.
    pub fn fail(&mut self) -> MachineResult<Transfer> {
        let prevfr = self.state.nondet.prevfr(self.state.regs.curfr)?;
        self.state.regs.maxfr = prevfr;
        self.state.regs.curfr = prevfr;
        self.state.nondet.zone().check_underflow(prevfr)?;
        let redoip = self.state.nondet.redoip(prevfr)?;
        trace!(target: "logitron::nondet", fr = prevfr, redoip, "fail");
        Ok(Transfer::Jump(redoip))
    }

    /// Re-enter the top frame's retry code without popping anything
    pub fn redo(&mut self) -> MachineResult<Transfer> {
        let maxfr = self.state.regs.maxfr;
        self.state.regs.curfr = maxfr;
        let redoip = self.state.nondet.redoip(maxfr)?;
        trace!(target: "logitron::nondet", fr = maxfr, redoip, "redo");
        Ok(Transfer::Jump(redoip))
    }

    /// Read saved variable `k` of the current frame
    #[inline]
    pub fn framevar(&self, k: usize) -> MachineResult<Word> {
        self.state.nondet.framevar(self.state.regs.curfr, k)
    }

    /// Write saved variable `k` of the current frame
    #[inline]
    pub fn set_framevar(&mut self, k: usize, word: Word) -> MachineResult<()> {
        let curfr = self.state.regs.curfr;
        self.state.nondet.set_framevar(curfr, k, word)
    }
}
