//! Memory zones.
//!
//! A `MemoryZone` is a bounds-checked contiguous region of machine words with
//! a floor, a hard end, and a high-water mark. Every stack or heap cursor in
//! the machine moves inside exactly one zone, and every operation that moves a
//! cursor calls the matching check immediately afterward.
//!
//! Invariant: `base (0) <= min <= cursor <= max_reached <= hard_end`.
//!
//! A violation is terminal: the resulting error is never caught by any
//! protocol operation, because continuing past an overflow would alias
//! adjacent memory. With the `unchecked` feature the cursor checks compile to
//! no-ops (raw word reads and writes stay bounds-checked, so safe Rust is
//! never violated; the feature only trades the high-water bookkeeping and the
//! early diagnostics for speed).

use tracing::trace;

use super::types::{MachineError, MachineResult};
use super::word::Word;

/// A bounds-checked region of machine words
#[derive(Debug, Clone)]
pub struct MemoryZone {
    /// Zone name used in diagnostics ("heap", "detstack", "nondstack", ...)
    name: &'static str,
    /// Backing storage; `words.len() == hard_end`
    words: Vec<Word>,
    /// Lowest index a cursor may reach
    min: usize,
    /// Highest cursor value observed so far
    max_reached: usize,
    /// One past the last usable index
    hard_end: usize,
    /// Whether `extend_or_fail` may grow the zone
    growable: bool,
}

impl MemoryZone {
    /// Create a fixed-size zone of `size` words
    pub fn new(name: &'static str, size: usize) -> Self {
        trace!(target: "logitron::zone", name, size, "create zone");
        Self {
            name,
            words: vec![Word::ZERO; size],
            min: 0,
            max_reached: 0,
            hard_end: size,
            growable: false,
        }
    }

    /// Create a zone that may grow past its initial size
    pub fn growable(name: &'static str, initial: usize) -> Self {
        let mut zone = Self::new(name, initial);
        zone.growable = true;
        zone
    }

    /// The zone's name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The current hard end (capacity in words)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.hard_end
    }

    /// The zone floor; cursors below this underflow
    #[inline]
    pub fn min(&self) -> usize {
        self.min
    }

    /// Raise the zone floor. Used once at machine setup, after the base
    /// choice-point frame is laid down.
    pub(super) fn set_min(&mut self, min: usize) {
        self.min = min;
    }

    /// The highest cursor value observed
    #[inline]
    pub fn max_reached(&self) -> usize {
        self.max_reached
    }

    /// Read the word at `idx`
    #[inline]
    pub fn read(&self, idx: usize) -> MachineResult<Word> {
        self.words.get(idx).copied().ok_or(MachineError::ZoneOverflow {
            zone: self.name,
            cursor: idx,
            limit: self.hard_end,
        })
    }

    /// Write the word at `idx`
    #[inline]
    pub fn write(&mut self, idx: usize, word: Word) -> MachineResult<()> {
        match self.words.get_mut(idx) {
            Some(slot) => {
                *slot = word;
                Ok(())
            }
            None => Err(MachineError::ZoneOverflow {
                zone: self.name,
                cursor: idx,
                limit: self.hard_end,
            }),
        }
    }

    /// Check a cursor against the hard end, recording the high-water mark.
    /// A cursor equal to `hard_end` is a full zone, not yet an overflow.
    #[cfg(not(feature = "unchecked"))]
    #[inline]
    pub fn check_overflow(&mut self, cursor: usize) -> MachineResult<()> {
        if cursor > self.hard_end {
            return Err(MachineError::ZoneOverflow {
                zone: self.name,
                cursor,
                limit: self.hard_end,
            });
        }
        if cursor > self.max_reached {
            self.max_reached = cursor;
        }
        Ok(())
    }

    #[cfg(feature = "unchecked")]
    #[inline(always)]
    pub fn check_overflow(&mut self, _cursor: usize) -> MachineResult<()> {
        Ok(())
    }

    /// Check a cursor against the zone floor
    #[cfg(not(feature = "unchecked"))]
    #[inline]
    pub fn check_underflow(&self, cursor: usize) -> MachineResult<()> {
        if cursor < self.min {
            return Err(MachineError::ZoneUnderflow {
                zone: self.name,
                cursor,
                floor: self.min,
            });
        }
        Ok(())
    }

    #[cfg(feature = "unchecked")]
    #[inline(always)]
    pub fn check_underflow(&self, _cursor: usize) -> MachineResult<()> {
        Ok(())
    }

    /// Ensure the zone can hold a cursor of `needed`, growing if permitted.
    ///
    /// Growth at least doubles the zone to keep the amortized cost linear.
    pub fn extend_or_fail(&mut self, needed: usize) -> MachineResult<()> {
        if needed <= self.hard_end {
            return Ok(());
        }
        if !self.growable {
            return Err(MachineError::ZoneOverflow {
                zone: self.name,
                cursor: needed,
                limit: self.hard_end,
            });
        }
        let new_end = needed.max(self.hard_end * 2);
        trace!(target: "logitron::zone", name = self.name, old = self.hard_end, new = new_end, "extend zone");
        self.words.resize(new_end, Word::ZERO);
        self.hard_end = new_end;
        Ok(())
    }
}
