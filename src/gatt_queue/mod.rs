//! BLE GATT Queue.
//!
//! Queues GATT requests per connection when the SoftDevice cannot take
//! them right away, and retries them when a BLE event on that connection
//! suggests the SoftDevice may be free again.
//!
//! 1. **Registry** - maps live connection handles to dense slots
//!    ([`GattQueue::register`], [`GattQueue::find`]).
//! 2. **Submission** - [`GattQueue::submit`] dispatches directly when the
//!    connection has nothing pending, otherwise deep-copies the request
//!    into the descriptor pool and payload arena.
//! 3. **Dispatcher** - [`GattQueue::try_process`] offers the head of one
//!    slot's FIFO to the SoftDevice; at most one request per connection is
//!    ever in flight.
//! 4. **Purge** - a disconnect clears the mapping immediately and defers
//!    freeing the connection's requests to the next `register`/`submit`.
//!
//! All entry points take `&mut self` and run to completion; there is no
//! internal locking. Firmware that reaches the queue from several tasks
//! wraps the whole instance in one mutex.
//!
//! Error handlers are plain function pointers and get no reference to the
//! queue, so a handler cannot submit into the instance that invoked it.
//! A queue shared through `RefCell` would refuse the nested borrow.

pub mod arena;
pub mod controller;
mod dispatch;
pub mod event;
pub mod pool;
pub mod purge;
pub mod request;

pub use arena::{PayloadArena, PayloadHandle};
pub use controller::{Controller, NrfError};
pub use event::{BleEvent, EventCategory};
pub use pool::{PendingList, ReqHandle, RequestPool};
pub use purge::PurgeList;
pub use request::{
    ErrorCallback, ErrorHandler, GattRequest, HandleRange, HvxParams, HvxType, Request,
    RequestKind, Uuid, WriteOp, WriteParams, BLE_CONN_HANDLE_INVALID,
};

use crate::config::{GQ_HEAP_SIZE, GQ_MAX_CONNECTIONS, GQ_REQ_BLOCKS};
use crate::error::Error;
use dispatch::{request_process, Outcome};

/// Queue sized from [`crate::config`].
pub type DefaultGattQueue<C> = GattQueue<C, GQ_MAX_CONNECTIONS, GQ_REQ_BLOCKS, GQ_HEAP_SIZE>;

/// How a successful [`GattQueue::submit`] disposed of the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Submitted {
    /// Handed to the SoftDevice before returning. Any SoftDevice error has
    /// already been delivered to the request's error handler.
    Accepted,
    /// Copied into the queue; it resolves from a later [`GattQueue::on_ble_evt`].
    Buffered,
}

/// Resource accounting snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GqStats {
    /// Registered connections.
    pub connections: usize,
    /// Request descriptors currently allocated.
    pub requests_in_use: usize,
    /// Payload arena bytes currently allocated.
    pub payload_bytes_in_use: usize,
    /// Live payload arena allocations.
    pub payload_allocations: usize,
    /// Slots disconnected but not yet drained.
    pub purges_pending: usize,
}

/// A buffered request: the submitted operation with its payload moved
/// into the arena.
#[derive(Clone, Copy, Debug)]
struct StoredRequest {
    op: GattRequest<Option<PayloadHandle>>,
    error_handler: Option<ErrorHandler>,
}

/// GATT queue instance.
///
/// - `MAX_CONNS`: connection handles that can be registered at once.
/// - `MAX_REQS`: request descriptors shared by all connections.
/// - `HEAP_SIZE`: payload arena bytes shared by all connections.
pub struct GattQueue<C, const MAX_CONNS: usize, const MAX_REQS: usize, const HEAP_SIZE: usize> {
    controller: C,
    conn_handles: [u16; MAX_CONNS],
    queues: [PendingList; MAX_CONNS],
    purge: PurgeList<MAX_CONNS>,
    pool: RequestPool<StoredRequest, MAX_REQS>,
    arena: PayloadArena<HEAP_SIZE, MAX_REQS>,
}

impl<C, const MAX_CONNS: usize, const MAX_REQS: usize, const HEAP_SIZE: usize>
    GattQueue<C, MAX_CONNS, MAX_REQS, HEAP_SIZE>
where
    C: Controller,
{
    pub fn new(controller: C) -> Self {
        Self {
            controller,
            conn_handles: [BLE_CONN_HANDLE_INVALID; MAX_CONNS],
            queues: [PendingList::new(); MAX_CONNS],
            purge: PurgeList::new(),
            pool: RequestPool::new(),
            arena: PayloadArena::new(),
        }
    }

    /// Register a connection handle and return its slot.
    ///
    /// Registering a handle that is already registered returns its
    /// existing slot, even when every slot is taken.
    pub fn register(&mut self, conn_handle: u16) -> Result<usize, Error> {
        self.purge_drain();

        if conn_handle == BLE_CONN_HANDLE_INVALID {
            return Err(Error::InvalidParam);
        }

        let mut unused = None;
        for (slot, &registered) in self.conn_handles.iter().enumerate() {
            if registered == conn_handle {
                return Ok(slot);
            }
            if registered == BLE_CONN_HANDLE_INVALID && unused.is_none() {
                unused = Some(slot);
            }
        }

        let Some(slot) = unused else {
            debug!("Failed to register connection handle {}", conn_handle);
            return Err(Error::OutOfSlots);
        };
        self.conn_handles[slot] = conn_handle;
        debug!("Registered connection handle {} in slot {}", conn_handle, slot);
        Ok(slot)
    }

    /// Slot of a registered connection handle.
    pub fn find(&self, conn_handle: u16) -> Option<usize> {
        if conn_handle == BLE_CONN_HANDLE_INVALID {
            return None;
        }
        self.conn_handles.iter().position(|&h| h == conn_handle)
    }

    /// Submit a request for `conn_handle`.
    ///
    /// If nothing is pending for the connection the request goes straight
    /// to the SoftDevice; a failure is then reported through its error
    /// handler before this returns. Otherwise, or if the SoftDevice is
    /// busy, the request is copied to the tail of the connection's queue.
    /// Running out of descriptors or arena space leaves no trace.
    pub fn submit(&mut self, conn_handle: u16, req: Request<'_>) -> Result<Submitted, Error> {
        self.purge_drain();

        let slot = self.find(conn_handle).ok_or(Error::InvalidParam)?;
        if let Some(payload) = req.op.payload() {
            if u16::try_from(payload.len()).is_err() {
                return Err(Error::InvalidParam);
            }
        }

        if self.queues[slot].is_empty() {
            let outcome = request_process(
                &mut self.controller,
                conn_handle,
                &req.op,
                req.error_handler.as_ref(),
            );
            if outcome == Outcome::Resolved {
                return Ok(Submitted::Accepted);
            }
        }

        self.buffer(slot, req)?;
        Ok(Submitted::Buffered)
    }

    /// Deep-copy `req` into the pool and append it to `slot`'s queue.
    fn buffer(&mut self, slot: usize, req: Request<'_>) -> Result<(), Error> {
        let arena = &mut self.arena;
        let handle = self.pool.alloc_with(|| -> Result<StoredRequest, Error> {
            let op = req.op.try_map_payload(|bytes| {
                if bytes.is_empty() {
                    Ok(None)
                } else {
                    arena.alloc(bytes).map(Some)
                }
            })?;
            Ok(StoredRequest {
                op,
                error_handler: req.error_handler,
            })
        })?;

        self.queues[slot].push_back(&mut self.pool, handle);
        debug!(
            "Buffered {} for slot {} ({} pending)",
            req.op.kind(),
            slot,
            self.queues[slot].len()
        );
        Ok(())
    }

    /// Feed a SoftDevice BLE event to the queue.
    ///
    /// A disconnect unregisters the connection and schedules its pending
    /// requests for purging. Any GATTC/GATTS event retries the head of the
    /// connection's queue. Events for unregistered handles are ignored.
    pub fn on_ble_evt(&mut self, evt: &BleEvent) {
        match evt.category() {
            EventCategory::Invalidated(conn_handle) => {
                if let Some(slot) = self.find(conn_handle) {
                    self.purge_schedule(slot);
                }
            }
            EventCategory::MayBeReady(conn_handle) => {
                if let Some(slot) = self.find(conn_handle) {
                    self.try_process(slot);
                }
            }
            EventCategory::Irrelevant => {}
        }
    }

    /// Number of requests buffered for a registered connection.
    pub fn pending_len(&self, conn_handle: u16) -> Option<usize> {
        self.find(conn_handle).map(|slot| self.queues[slot].len())
    }

    pub fn stats(&self) -> GqStats {
        GqStats {
            connections: self
                .conn_handles
                .iter()
                .filter(|&&h| h != BLE_CONN_HANDLE_INVALID)
                .count(),
            requests_in_use: self.pool.in_use(),
            payload_bytes_in_use: self.arena.used(),
            payload_allocations: self.arena.allocations(),
            purges_pending: self.purge.len(),
        }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    /// Free a descriptor that is no longer linked into any queue, together
    /// with the payload it owns.
    fn release(
        pool: &mut RequestPool<StoredRequest, MAX_REQS>,
        arena: &mut PayloadArena<HEAP_SIZE, MAX_REQS>,
        handle: ReqHandle,
    ) {
        let payload = pool
            .get(handle)
            .and_then(|stored| stored.op.payload().copied().flatten());
        if let Some(payload) = payload {
            arena.free(payload);
        }
        pool.free(handle);
    }
}

#[cfg(test)]
mod tests;
