//! Fixed-size byte blocks with aligned bump allocation.
//!
//! A [`Block`] owns one contiguous `Vec<u8>` allocated to full length at
//! creation. Allocation only moves a cursor forward; the backing storage is
//! never reallocated, so bytes handed out stay at a fixed address until the
//! block is dropped.

/// A single contiguous block of arena memory.
pub struct Block {
    /// Backing storage. Allocated to full capacity at creation.
    data: Vec<u8>,
    /// Bump pointer: number of bytes consumed, padding included.
    used: usize,
}

impl Block {
    /// Create a new zero-filled block of `capacity` bytes.
    pub fn new(capacity: u32) -> Self {
        Self {
            data: vec![0; capacity as usize],
            used: 0,
        }
    }

    /// Padding needed before the next allocation so that its real address
    /// is a multiple of `align`.
    fn padding(&self, align: usize) -> usize {
        let addr = (self.data.as_ptr() as usize).wrapping_add(self.used);
        (align - addr % align) % align
    }

    /// Whether `size` bytes aligned to `align` fit in the remaining space.
    pub fn fits(&self, size: usize, align: usize) -> bool {
        self.padding(align)
            .checked_add(size)
            .is_some_and(|need| need <= self.remaining())
    }

    /// Bump-allocate `size` bytes aligned to `align`.
    ///
    /// Returns the offset of the allocation within this block, or `None` if
    /// the request (including alignment padding) does not fit. `align` must
    /// be non-zero.
    pub fn alloc(&mut self, size: usize, align: usize) -> Option<usize> {
        if !self.fits(size, align) {
            return None;
        }
        let offset = self.used + self.padding(align);
        self.used = offset + size;
        Some(offset)
    }

    /// Get a shared slice at the given offset and length.
    ///
    /// Returns `None` if the range reaches past the allocated region.
    pub fn slice(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        if end > self.used {
            return None;
        }
        Some(&self.data[offset..end])
    }

    /// Get a mutable slice at the given offset and length.
    ///
    /// Returns `None` if the range reaches past the allocated region.
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        if end > self.used {
            return None;
        }
        Some(&mut self.data[offset..end])
    }

    /// Reset the bump pointer to zero without deallocating.
    ///
    /// Contents are left in place and overwritten by later allocations.
    pub fn reset(&mut self) {
        self.used = 0;
    }

    /// Number of bytes consumed so far, alignment padding included.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Remaining free capacity in bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.used
    }
}
