//! Fixed-capacity request descriptor pool.
//!
//! Descriptors live in a static array and are addressed by index. Each
//! entry also carries an intrusive `next` link, so the per-connection
//! pending lists ([`PendingList`]) thread through the pool without any
//! storage of their own.

use heapless::Vec;

use crate::error::AllocError;

/// Index of an allocated descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReqHandle(u16);

impl ReqHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct Entry<T> {
    value: Option<T>,
    next: Option<ReqHandle>,
}

/// Pool of `N` descriptors holding values of type `T`.
pub struct RequestPool<T, const N: usize> {
    entries: [Entry<T>; N],
    /// Free indices, lowest on top.
    free: Vec<u16, N>,
}

impl<T, const N: usize> RequestPool<T, N> {
    const INDEX_FITS: () = assert!(N <= u16::MAX as usize, "pool index must fit in u16");

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::INDEX_FITS;

        let mut free = Vec::new();
        for idx in (0..N as u16).rev() {
            // Cannot fail: exactly N pushes into a Vec of capacity N.
            let _ = free.push(idx);
        }
        Self {
            entries: core::array::from_fn(|_| Entry {
                value: None,
                next: None,
            }),
            free,
        }
    }

    /// Take a free descriptor and fill it with the value produced by `init`.
    ///
    /// If `init` fails the descriptor is returned to the pool before the
    /// error is propagated, so a failed allocation leaves nothing behind.
    pub fn alloc_with<E>(
        &mut self,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<ReqHandle, E>
    where
        E: From<AllocError>,
    {
        let idx = self.free.pop().ok_or(AllocError::OutOfDescriptors)?;
        match init() {
            Ok(value) => {
                let entry = &mut self.entries[idx as usize];
                entry.value = Some(value);
                entry.next = None;
                Ok(ReqHandle(idx))
            }
            Err(e) => {
                // Cannot fail: the index was just popped.
                let _ = self.free.push(idx);
                Err(e)
            }
        }
    }

    pub fn alloc(&mut self, value: T) -> Result<ReqHandle, AllocError> {
        self.alloc_with(|| Ok(value))
    }

    /// Release a descriptor, returning the value it held.
    ///
    /// Freeing a handle that is not allocated is a no-op returning `None`.
    pub fn free(&mut self, handle: ReqHandle) -> Option<T> {
        let entry = self.entries.get_mut(handle.index())?;
        let value = entry.value.take()?;
        entry.next = None;
        // Cannot fail: an allocated index is never on the free list.
        let _ = self.free.push(handle.0);
        Some(value)
    }

    pub fn get(&self, handle: ReqHandle) -> Option<&T> {
        self.entries.get(handle.index())?.value.as_ref()
    }

    /// Number of descriptors currently allocated.
    pub fn in_use(&self) -> usize {
        N - self.free.len()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    fn next(&self, handle: ReqHandle) -> Option<ReqHandle> {
        self.entries.get(handle.index())?.next
    }

    fn set_next(&mut self, handle: ReqHandle, next: Option<ReqHandle>) {
        if let Some(entry) = self.entries.get_mut(handle.index()) {
            entry.next = next;
        }
    }
}

impl<T, const N: usize> Default for RequestPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// FIFO of descriptors linked through a [`RequestPool`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PendingList {
    head: Option<ReqHandle>,
    tail: Option<ReqHandle>,
    len: usize,
}

impl PendingList {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn front(&self) -> Option<ReqHandle> {
        self.head
    }

    pub fn push_back<T, const N: usize>(&mut self, pool: &mut RequestPool<T, N>, handle: ReqHandle) {
        pool.set_next(handle, None);
        match self.tail {
            Some(tail) => pool.set_next(tail, Some(handle)),
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        self.len += 1;
    }

    /// Unlink the head. The descriptor stays allocated.
    pub fn pop_front<T, const N: usize>(&mut self, pool: &mut RequestPool<T, N>) -> Option<ReqHandle> {
        let head = self.head?;
        self.head = pool.next(head);
        pool.set_next(head, None);
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(head)
    }
}
