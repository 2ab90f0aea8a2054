//! Growable bump arena built from doubling blocks.
//!
//! An [`Arena`] hands out [`ArenaSlot`]s pointing into a list of
//! [`Block`]s. When no block from the current one onward can satisfy a
//! request, a new block twice the size of the last one is appended.
//! [`Arena::clear`] rewinds every block and keeps the memory;
//! [`Arena::free`] releases it. Both bump the generation so that slots
//! issued earlier resolve to [`ArenaError::StaleHandle`].

use crate::block::Block;
use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::handle::ArenaSlot;

/// A growable bump allocator over byte blocks.
pub struct Arena {
    blocks: Vec<Block>,
    /// Index of the block allocation starts searching from.
    current: usize,
    first_block_size: u32,
    generation: u32,
}

impl Arena {
    /// Create an empty arena. No memory is reserved until the first
    /// allocation.
    pub fn new(config: &ArenaConfig) -> Self {
        Self {
            blocks: Vec::new(),
            current: 0,
            first_block_size: config.first_block_size,
            generation: 0,
        }
    }

    /// Create an empty arena whose first block holds `first_block_size` bytes.
    pub fn with_first_block(first_block_size: u32) -> Self {
        Self::new(&ArenaConfig::new(first_block_size))
    }

    /// Reserve `size` bytes aligned to `align` and return their location.
    ///
    /// Returns `None` for a zero-byte request. An `align` of 0 is treated
    /// as 1. Blocks from the current one onward are tried in order; the
    /// first that fits becomes current. If none fits, a new block is
    /// appended.
    ///
    /// # Panics
    ///
    /// Panics if `size` plus worst-case alignment padding exceeds the
    /// maximum block size. Running out of memory aborts, as with any heap
    /// allocation.
    pub fn allocate(&mut self, size: u32, align: u32) -> Option<ArenaSlot> {
        if size == 0 {
            return None;
        }
        let align = align.max(1) as usize;
        let len = size as usize;

        for index in self.current..self.blocks.len() {
            if let Some(offset) = self.blocks[index].alloc(len, align) {
                self.current = index;
                return Some(self.slot(index, offset, size));
            }
        }

        let capacity = self.next_block_size(size, align);
        let mut block = Block::new(capacity);
        let offset = match block.alloc(len, align) {
            Some(offset) => offset,
            None => panic!(
                "arena allocation of {size} bytes (align {align}) exceeds the maximum block size"
            ),
        };
        self.blocks.push(block);
        self.current = self.blocks.len() - 1;
        Some(self.slot(self.current, offset, size))
    }

    /// Copy `bytes` into the arena with byte alignment.
    ///
    /// Returns `None` for an empty input.
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> Option<ArenaSlot> {
        let size = u32::try_from(bytes.len()).ok()?;
        let slot = self.allocate(size, 1)?;
        let block = &mut self.blocks[slot.block as usize];
        if let Some(dst) = block.slice_mut(slot.offset as usize, slot.len as usize) {
            dst.copy_from_slice(bytes);
        }
        Some(slot)
    }

    /// Resolve a slot to its bytes.
    pub fn get(&self, slot: ArenaSlot) -> Result<&[u8], ArenaError> {
        self.check_generation(slot)?;
        self.blocks
            .get(slot.block as usize)
            .and_then(|b| b.slice(slot.offset as usize, slot.len as usize))
            .ok_or(ArenaError::OutOfBounds {
                block: slot.block,
                offset: slot.offset,
                len: slot.len,
            })
    }

    /// Resolve a slot to its bytes for writing.
    pub fn get_mut(&mut self, slot: ArenaSlot) -> Result<&mut [u8], ArenaError> {
        self.check_generation(slot)?;
        self.blocks
            .get_mut(slot.block as usize)
            .and_then(|b| b.slice_mut(slot.offset as usize, slot.len as usize))
            .ok_or(ArenaError::OutOfBounds {
                block: slot.block,
                offset: slot.offset,
                len: slot.len,
            })
    }

    /// Rewind every block and the search cursor, keeping all memory.
    ///
    /// Slots issued before this call become stale.
    pub fn clear(&mut self) {
        for block in &mut self.blocks {
            block.reset();
        }
        self.current = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Release every block, returning the arena to its freshly created state.
    ///
    /// Slots issued before this call become stale.
    pub fn free(&mut self) {
        self.blocks = Vec::new();
        self.current = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Current generation. Incremented by [`clear`](Self::clear) and
    /// [`free`](Self::free).
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of blocks currently owned.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Capacity in bytes of block `index`, if it exists.
    pub fn block_capacity(&self, index: usize) -> Option<usize> {
        self.blocks.get(index).map(Block::capacity)
    }

    /// Bytes consumed across all blocks, alignment padding included.
    pub fn bytes_used(&self) -> usize {
        self.blocks.iter().map(Block::used).sum()
    }

    /// Total capacity of all blocks in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.blocks.iter().map(Block::capacity).sum()
    }

    fn slot(&self, block: usize, offset: usize, size: u32) -> ArenaSlot {
        // Blocks never exceed u32::MAX bytes, so offsets fit.
        ArenaSlot::new(self.generation, block as u32, offset as u32, size)
    }

    fn check_generation(&self, slot: ArenaSlot) -> Result<(), ArenaError> {
        if slot.generation != self.generation {
            return Err(ArenaError::StaleHandle {
                handle_generation: slot.generation,
                current: self.generation,
            });
        }
        Ok(())
    }

    /// Size of the next block: the configured first size, then double the
    /// previous block, doubled again until `size + align - 1` fits.
    fn next_block_size(&self, size: u32, align: usize) -> u32 {
        let needed = u64::from(size) + align as u64 - 1;
        let mut capacity = match self.blocks.last() {
            None => u64::from(self.first_block_size.max(1)),
            Some(last) => last.capacity() as u64 * 2,
        };
        while capacity < needed {
            capacity *= 2;
        }
        capacity.min(u64::from(ArenaConfig::MAX_BLOCK_SIZE)) as u32
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(&ArenaConfig::default())
    }
}
