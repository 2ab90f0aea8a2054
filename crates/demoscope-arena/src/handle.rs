//! Arena slot handles.
//!
//! An [`ArenaSlot`] encodes the physical location of an allocation within
//! an [`Arena`](crate::Arena). It is generation-scoped: the `generation`
//! field allows O(1) staleness checks after the arena is cleared.

use std::fmt;

/// Location of a single allocation inside an arena.
///
/// Slots are plain `Copy` values; they do not borrow the arena. Resolve
/// them with [`Arena::get`](crate::Arena::get).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub struct ArenaSlot {
    /// Arena generation when this allocation was made.
    pub(crate) generation: u32,
    /// Index of the block holding the allocation.
    pub(crate) block: u32,
    /// Byte offset within the block (after alignment padding).
    pub(crate) offset: u32,
    /// Length of the allocation in bytes.
    pub(crate) len: u32,
}

impl ArenaSlot {
    /// Create a new slot.
    pub(crate) fn new(generation: u32, block: u32, offset: u32, len: u32) -> Self {
        Self {
            generation,
            block,
            offset,
            len,
        }
    }

    /// The generation this slot belongs to.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Index of the block holding the allocation.
    pub fn block(&self) -> u32 {
        self.block
    }

    /// Byte offset within the block.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Length of the allocation in bytes.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether this slot covers zero bytes.
    ///
    /// The arena never hands these out; they only exist as defaults.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for ArenaSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ArenaSlot(gen={}, block={}, off={}, len={})",
            self.generation, self.block, self.offset, self.len
        )
    }
}
