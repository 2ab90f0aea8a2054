//! Arena configuration parameters.

/// Configuration for the arena allocator.
///
/// Only the first block is sized from configuration; every later block
/// doubles the size of its predecessor.
#[derive(Clone, Debug)]
pub struct ArenaConfig {
    /// Size of the first block in bytes.
    ///
    /// Default: 32_768. Values below 1 are raised to 1 when the block
    /// is created.
    pub first_block_size: u32,
}

impl ArenaConfig {
    /// Default first block size: 32 KiB.
    pub const DEFAULT_FIRST_BLOCK_SIZE: u32 = 1 << 15;

    /// Hard cap on the size of any single block.
    pub const MAX_BLOCK_SIZE: u32 = u32::MAX;

    /// Create a config with the given first block size.
    pub fn new(first_block_size: u32) -> Self {
        Self { first_block_size }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FIRST_BLOCK_SIZE)
    }
}
