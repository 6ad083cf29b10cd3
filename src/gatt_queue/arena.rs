//! Bounded byte arena for buffered request payloads.
//!
//! First-fit allocator over a static buffer. Allocated extents are kept
//! sorted by offset in a table of at most `BLOCKS` entries, so both the
//! byte budget (`SIZE`) and the number of live allocations are fixed at
//! compile time. Freed space is reusable immediately; neighbouring free
//! gaps merge implicitly because only allocated extents are tracked.

use heapless::Vec;

use crate::error::AllocError;

/// A region of the arena owned by one buffered request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PayloadHandle {
    offset: usize,
    len: usize,
}

impl PayloadHandle {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct PayloadArena<const SIZE: usize, const BLOCKS: usize> {
    buf: [u8; SIZE],
    extents: Vec<PayloadHandle, BLOCKS>,
}

impl<const SIZE: usize, const BLOCKS: usize> PayloadArena<SIZE, BLOCKS> {
    pub const fn new() -> Self {
        Self {
            buf: [0; SIZE],
            extents: Vec::new(),
        }
    }

    /// Copy `bytes` into a fresh region.
    pub fn alloc(&mut self, bytes: &[u8]) -> Result<PayloadHandle, AllocError> {
        if self.extents.is_full() {
            return Err(AllocError::OutOfMemory);
        }

        let len = bytes.len();
        let mut cursor = 0;
        let mut slot = self.extents.len();
        for (i, extent) in self.extents.iter().enumerate() {
            if extent.offset - cursor >= len {
                slot = i;
                break;
            }
            cursor = extent.offset + extent.len;
        }
        if slot == self.extents.len() && SIZE - cursor < len {
            return Err(AllocError::OutOfMemory);
        }

        let handle = PayloadHandle {
            offset: cursor,
            len,
        };
        self.extents
            .insert(slot, handle)
            .map_err(|_| AllocError::OutOfMemory)?;
        self.buf[cursor..cursor + len].copy_from_slice(bytes);
        trace!("payload alloc: {} bytes at offset {}", len, cursor);
        Ok(handle)
    }

    /// Release a region. Returns `false` if `handle` is not allocated.
    pub fn free(&mut self, handle: PayloadHandle) -> bool {
        match self.extents.iter().position(|e| *e == handle) {
            Some(i) => {
                self.extents.remove(i);
                trace!("payload free: {} bytes at offset {}", handle.len, handle.offset);
                true
            }
            None => {
                warn!("payload free of unknown region at offset {}", handle.offset);
                false
            }
        }
    }

    pub fn get(&self, handle: PayloadHandle) -> &[u8] {
        self.buf
            .get(handle.offset..handle.offset + handle.len)
            .unwrap_or(&[])
    }

    /// Bytes currently allocated.
    pub fn used(&self) -> usize {
        self.extents.iter().map(|e| e.len).sum()
    }

    /// Number of live allocations.
    pub fn allocations(&self) -> usize {
        self.extents.len()
    }

    pub fn capacity(&self) -> usize {
        SIZE
    }
}

impl<const SIZE: usize, const BLOCKS: usize> Default for PayloadArena<SIZE, BLOCKS> {
    fn default() -> Self {
        Self::new()
    }
}
