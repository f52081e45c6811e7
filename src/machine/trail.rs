//! The trail: a log of destructive updates undone on backtracking.
//!
//! Generated code records the old value of a heap cell or det stack slot
//! before overwriting it; `undo_to` replays the log backwards to a saved
//! cursor. The ticket counters exist for the re-entrant call boundary, which
//! must save and restore them atomically with the special registers.

use tracing::trace;

use super::detstack::DetStack;
use super::heap::Heap;
use super::types::{MachineError, MachineResult};
use super::word::Word;

/// A trailed location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailLoc {
    /// Heap cell index
    Heap(usize),
    /// Absolute det stack slot index
    Det(usize),
}

#[derive(Debug, Clone, Copy)]
struct TrailEntry {
    loc: TrailLoc,
    old: Word,
}

/// The write-once update log
#[derive(Debug, Clone, Default)]
pub struct Trail {
    entries: Vec<TrailEntry>,
    ticket_counter: u64,
    ticket_high_water: u64,
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current log cursor; everything past it is newer
    #[inline]
    pub fn cursor(&self) -> usize {
        self.entries.len()
    }

    /// Record the old value of a location about to be overwritten
    pub fn record(&mut self, loc: TrailLoc, old: Word) {
        trace!(target: "logitron::trail", ?loc, cursor = self.entries.len(), "record");
        self.entries.push(TrailEntry { loc, old });
    }

    /// Undo every update recorded after `cursor`, newest first
    pub fn undo_to(
        &mut self,
        cursor: usize,
        heap: &mut Heap,
        detstack: &mut DetStack,
    ) -> MachineResult<()> {
        if cursor > self.entries.len() {
            return Err(MachineError::BadTrailMark {
                mark: cursor,
                cursor: self.entries.len(),
            });
        }
        trace!(target: "logitron::trail", from = self.entries.len(), to = cursor, "undo_to");
        let newer = self.entries.split_off(cursor);
        for entry in newer.into_iter().rev() {
            match entry.loc {
                TrailLoc::Heap(idx) => heap.write(idx, entry.old)?,
                TrailLoc::Det(idx) => detstack.write_abs(idx, entry.old)?,
            }
        }
        Ok(())
    }

    /// Discard entries past `cursor` without undoing them. Used by the call
    /// boundary, which restores the log cursor and leaves value recovery to
    /// the thrower.
    pub fn truncate(&mut self, cursor: usize) {
        self.entries.truncate(cursor);
    }

    /// Allocate a fresh ticket, advancing the high-water mark
    pub fn new_ticket(&mut self) -> u64 {
        self.ticket_counter += 1;
        if self.ticket_counter > self.ticket_high_water {
            self.ticket_high_water = self.ticket_counter;
        }
        self.ticket_counter
    }

    #[inline]
    pub fn ticket_counter(&self) -> u64 {
        self.ticket_counter
    }

    #[inline]
    pub fn ticket_high_water(&self) -> u64 {
        self.ticket_high_water
    }

    /// Restore the counters saved at a call boundary
    pub(super) fn restore_counters(&mut self, counter: u64, high_water: u64) {
        self.ticket_counter = counter;
        self.ticket_high_water = high_water;
    }
}
