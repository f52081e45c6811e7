//! Heap allocation.
//!
//! The heap is a bump allocator over a memory zone. `allocate` hands out a
//! tagged pointer to `count` fresh cells and moves the allocation cursor
//! forward; `mark`/`restore` roll the cursor back when backtracking discards
//! speculative allocation.
//!
//! The collector behind this interface is pluggable: the machine needs only
//! allocation plus mark/restore, so a tracing collector or an arena with
//! explicit lifetime can sit underneath without the protocol changing.

use tracing::trace;

use super::types::{MachineError, MachineResult};
use super::word::{make_tagged, untag, Tag, Word, FLOAT_WORDS};
use super::zone::MemoryZone;

/// A captured heap allocation cursor.
///
/// Marks obey a stack discipline: restoring to a mark discards every mark
/// taken after it. Restoring does not re-validate interior references;
/// protocol discipline guarantees none survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapMark(usize);

impl HeapMark {
    /// The cursor value this mark captured
    #[inline]
    pub fn cursor(self) -> usize {
        self.0
    }

    /// Pack the mark into an untyped word, so generated code can park it in
    /// a choice-point frame slot.
    #[inline]
    pub fn to_word(self) -> Word {
        Word::from_bits(self.0 as u64)
    }

    /// Unpack a mark saved with `to_word`
    #[inline]
    pub fn from_word(word: Word) -> Self {
        HeapMark(word.bits() as usize)
    }
}

/// A bump allocator over a memory zone
#[derive(Debug, Clone)]
pub struct Heap {
    zone: MemoryZone,
    /// Allocation cursor: index of the next free cell
    hp: usize,
}

impl Heap {
    /// Create a heap of `size` words, optionally growable
    pub fn new(name: &'static str, size: usize, growable: bool) -> Self {
        let zone = if growable {
            MemoryZone::growable(name, size)
        } else {
            MemoryZone::new(name, size)
        };
        Self { zone, hp: 0 }
    }

    /// The current allocation cursor
    #[inline]
    pub fn hp(&self) -> usize {
        self.hp
    }

    /// The underlying zone
    #[inline]
    pub fn zone(&self) -> &MemoryZone {
        &self.zone
    }

    /// Allocate `count` cells and return a pointer to them under `tag`
    pub fn allocate(&mut self, tag: Tag, count: usize) -> MachineResult<Word> {
        let cell = self.hp;
        let new_hp = self.hp + count;
        self.zone.extend_or_fail(new_hp)?;
        self.hp = new_hp;
        self.zone.check_overflow(self.hp)?;
        trace!(target: "logitron::heap", cell, count, hp = self.hp, "incr_hp");
        Ok(make_tagged(tag, cell as u64))
    }

    /// Allocate cells guaranteed to contain no heap pointers.
    ///
    /// A tracing collector may skip scanning these cells; to a conservative
    /// one the variant is indistinguishable from `allocate`.
    #[inline]
    pub fn allocate_atomic(&mut self, tag: Tag, count: usize) -> MachineResult<Word> {
        self.allocate(tag, count)
    }

    /// Capture the allocation cursor.
    ///
    /// Contract: no collection may run between a mark and its restore, and
    /// no reference into cells allocated after the mark may outlive the
    /// restore. Marks form a stack, not arbitrary time travel.
    #[inline]
    pub fn mark(&self) -> HeapMark {
        HeapMark(self.hp)
    }

    /// Roll the allocation cursor back to `mark`, discarding everything
    /// allocated since.
    pub fn restore(&mut self, mark: HeapMark) -> MachineResult<()> {
        if mark.0 > self.hp {
            return Err(MachineError::BadHeapMark { mark: mark.0, hp: self.hp });
        }
        trace!(target: "logitron::heap", from = self.hp, to = mark.0, "restore_hp");
        self.hp = mark.0;
        Ok(())
    }

    /// Read the word in cell `idx`
    #[inline]
    pub fn read(&self, idx: usize) -> MachineResult<Word> {
        self.zone.read(idx)
    }

    /// Write the word in cell `idx`
    #[inline]
    pub fn write(&mut self, idx: usize, word: Word) -> MachineResult<()> {
        self.zone.write(idx, word)
    }

    /// Read the cell a tagged pointer refers to, at field offset `field`
    #[inline]
    pub fn field(&self, ptr: Word, field: usize) -> MachineResult<Word> {
        self.read(untag(ptr) as usize + field)
    }

    /// Write the cell a tagged pointer refers to, at field offset `field`
    #[inline]
    pub fn set_field(&mut self, ptr: Word, field: usize, word: Word) -> MachineResult<()> {
        self.write(untag(ptr) as usize + field, word)
    }

    /// Box a double-precision float, returning a tagged pointer to it
    pub fn box_float(&mut self, tag: Tag, value: f64) -> MachineResult<Word> {
        let ptr = self.allocate_atomic(tag, FLOAT_WORDS)?;
        self.set_field(ptr, 0, Word::from_bits(value.to_bits()))?;
        Ok(ptr)
    }

    /// Read a boxed double-precision float back
    pub fn unbox_float(&self, ptr: Word) -> MachineResult<f64> {
        Ok(f64::from_bits(self.field(ptr, 0)?.bits()))
    }
}
