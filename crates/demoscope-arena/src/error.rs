//! Arena-specific error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur when resolving an [`ArenaSlot`](crate::ArenaSlot).
///
/// Allocation itself never fails recoverably: running out of memory is
/// fatal, exactly like any other heap allocation in Rust.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The slot was issued before the arena was last cleared or freed.
    StaleHandle {
        /// The generation encoded in the slot.
        handle_generation: u32,
        /// The arena's current generation.
        current: u32,
    },
    /// The slot points outside every live block.
    ///
    /// Only reachable with a slot issued by a different arena.
    OutOfBounds {
        /// Block index encoded in the slot.
        block: u32,
        /// Byte offset encoded in the slot.
        offset: u32,
        /// Length encoded in the slot.
        len: u32,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleHandle {
                handle_generation,
                current,
            } => {
                write!(
                    f,
                    "stale arena slot: generation {handle_generation}, current {current}"
                )
            }
            Self::OutOfBounds { block, offset, len } => {
                write!(
                    f,
                    "arena slot out of bounds: block {block}, offset {offset}, len {len}"
                )
            }
        }
    }
}

impl Error for ArenaError {}
