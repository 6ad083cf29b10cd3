//! Deferred release of a disconnected link's pending requests.
//!
//! A disconnect only marks the slot (O(1), safe on the event path). The
//! marked slots are emptied at the start of the next `register` or
//! `submit`, before that call does anything else. Memory is therefore
//! reclaimed no sooner and no later than the next registry operation.

use heapless::Vec;

use super::{Controller, GattQueue};

/// Slots awaiting a purge. Holds each slot at most once, so a capacity of
/// one entry per slot can never overflow.
#[derive(Clone, Debug, Default)]
pub struct PurgeList<const N: usize> {
    slots: Vec<usize, N>,
}

impl<const N: usize> PurgeList<N> {
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Mark `slot`. Returns `false` if it was already marked.
    pub fn schedule(&mut self, slot: usize) -> bool {
        if self.is_scheduled(slot) {
            return false;
        }
        if self.slots.push(slot).is_err() {
            warn!("purge list full, slot {} not scheduled", slot);
            return false;
        }
        true
    }

    pub fn is_scheduled(&self, slot: usize) -> bool {
        self.slots.contains(&slot)
    }

    /// Take every marked slot, leaving the list empty.
    pub fn take(&mut self) -> Vec<usize, N> {
        core::mem::take(&mut self.slots)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<C, const MAX_CONNS: usize, const MAX_REQS: usize, const HEAP_SIZE: usize>
    GattQueue<C, MAX_CONNS, MAX_REQS, HEAP_SIZE>
where
    C: Controller,
{
    /// Mark `slot` for purging and drop its connection mapping.
    ///
    /// Runs on the event path: constant work regardless of queue depth.
    pub(crate) fn purge_schedule(&mut self, slot: usize) {
        let Some(conn_handle) = self.conn_handles.get_mut(slot) else {
            return;
        };
        let old = core::mem::replace(conn_handle, super::BLE_CONN_HANDLE_INVALID);
        if self.purge.schedule(slot) {
            debug!("Scheduled purge of request queue {} (conn {})", slot, old);
        }
    }

    /// Free every request held by slots marked for purging.
    pub(crate) fn purge_drain(&mut self) {
        if self.purge.is_empty() {
            return;
        }
        for slot in self.purge.take() {
            let Some(queue) = self.queues.get_mut(slot) else {
                continue;
            };
            let mut freed = 0usize;
            while let Some(handle) = queue.pop_front(&mut self.pool) {
                Self::release(&mut self.pool, &mut self.arena, handle);
                freed += 1;
            }
            debug!("Purged request queue {}: {} requests freed", slot, freed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_is_idempotent_until_taken() {
        let mut list: PurgeList<2> = PurgeList::new();
        assert!(list.schedule(1));
        assert!(!list.schedule(1));
        assert_eq!(list.len(), 1);
        assert!(list.is_scheduled(1));
        assert!(!list.is_scheduled(0));

        let taken = list.take();
        assert_eq!(taken.as_slice(), &[1]);
        assert!(list.is_empty());
        assert!(list.schedule(1));
    }

    #[test]
    fn every_slot_fits() {
        let mut list: PurgeList<3> = PurgeList::new();
        for slot in 0..3 {
            assert!(list.schedule(slot));
        }
        assert_eq!(list.len(), 3);
    }
}
