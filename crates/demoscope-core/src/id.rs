//! Strongly-typed identifiers.

use std::fmt;

/// Number of bits in an entity index on the wire.
pub const ENTITY_INDEX_BITS: u32 = 11;

/// Exclusive upper bound on entity indices.
pub const MAX_EDICTS: u32 = 1 << ENTITY_INDEX_BITS;

/// Number of bits in an entity serial number.
pub const ENTITY_SERIAL_BITS: u32 = 10;

/// Simulation tick stamped on every framed message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tick(pub i32);

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for Tick {
    fn from(v: i32) -> Self {
        Self(v)
    }
}

/// Dense server class identifier, `0..class_count`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u16);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for ClassId {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// Index of an entity slot, `0..MAX_EDICTS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityIndex(pub u16);

impl fmt::Display for EntityIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for EntityIndex {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// Opaque entity handle: the slot index in the low bits and the serial
/// number above it, as the engine packs it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityHandle(pub u32);

impl EntityHandle {
    /// Pack an index and serial number.
    pub fn new(index: EntityIndex, serial: u32) -> Self {
        Self(u32::from(index.0) | (serial << ENTITY_INDEX_BITS))
    }

    /// The entity slot.
    pub fn index(self) -> EntityIndex {
        EntityIndex((self.0 & (MAX_EDICTS - 1)) as u16)
    }

    /// The serial number.
    pub fn serial(self) -> u32 {
        self.0 >> ENTITY_INDEX_BITS
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index(), self.serial())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_packs_index_and_serial() {
        let h = EntityHandle::new(EntityIndex(5), 713);
        assert_eq!(h.0, 5 | (713 << 11));
        assert_eq!(h.index(), EntityIndex(5));
        assert_eq!(h.serial(), 713);
        assert_eq!(h.to_string(), "5#713");
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn handle_fields_survive_packing(
                index in 0u16..MAX_EDICTS as u16,
                serial in 0u32..(1 << ENTITY_SERIAL_BITS),
            ) {
                let h = EntityHandle::new(EntityIndex(index), serial);
                prop_assert_eq!(h.index(), EntityIndex(index));
                prop_assert_eq!(h.serial(), serial);
            }
        }
    }
}
