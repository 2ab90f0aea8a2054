//! Arena-backed byte strings.
//!
//! Names decoded from bit-packed payloads (send tables, string tables, net
//! messages) are copied into one of the session's arenas. An [`ArenaStr`]
//! records which arena and where; it is resolved back to bytes through the
//! handler context while the arena generation that produced it is live.

use demoscope_arena::{Arena, ArenaError, ArenaSlot};

/// Which session arena a string lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pool {
    /// Lives until the next data-tables message or the end of the session.
    Schema,
    /// Cleared before every container message.
    Temp,
}

/// A byte string stored in a session arena.
///
/// The empty string owns no arena bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArenaStr {
    pool: Pool,
    slot: Option<ArenaSlot>,
}

impl ArenaStr {
    /// The empty string in `pool`.
    pub fn empty(pool: Pool) -> Self {
        Self { pool, slot: None }
    }

    /// Copy `bytes` into `arena`, tagging the result with `pool`.
    pub fn intern(arena: &mut Arena, pool: Pool, bytes: &[u8]) -> Self {
        Self {
            pool,
            slot: arena.alloc_bytes(bytes),
        }
    }

    /// The pool this string was interned into.
    pub fn pool(&self) -> Pool {
        self.pool
    }

    /// Whether this is the empty string.
    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    /// Resolve against the arena backing [`pool`](Self::pool).
    pub fn resolve<'a>(&self, arena: &'a Arena) -> Result<&'a [u8], ArenaError> {
        match self.slot {
            Some(slot) => arena.get(slot),
            None => Ok(&[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_and_resolve() {
        let mut arena = Arena::with_first_block(64);
        let s = ArenaStr::intern(&mut arena, Pool::Schema, b"DT_BasePlayer");
        assert_eq!(s.pool(), Pool::Schema);
        assert_eq!(s.resolve(&arena).unwrap(), b"DT_BasePlayer");
    }

    #[test]
    fn empty_string_needs_no_arena() {
        let mut arena = Arena::with_first_block(64);
        let s = ArenaStr::intern(&mut arena, Pool::Temp, b"");
        assert!(s.is_empty());
        assert_eq!(arena.block_count(), 0);
        assert_eq!(s.resolve(&arena).unwrap(), b"");
    }

    #[test]
    fn cleared_arena_reports_stale() {
        let mut arena = Arena::with_first_block(64);
        let s = ArenaStr::intern(&mut arena, Pool::Temp, b"m_iHealth");
        arena.clear();
        assert!(matches!(
            s.resolve(&arena),
            Err(ArenaError::StaleHandle { .. })
        ));
    }
}
