//! Compile-time configuration of the default GATT queue instance.
//!
//! Capacities are fixed at type-definition time so that exhaustion fails
//! predictably. Integrators needing other sizes instantiate
//! [`GattQueue`](crate::gatt_queue::GattQueue) with their own const parameters.

// GATT queue

/// Maximum number of connection handles that can be registered at once.
pub const GQ_MAX_CONNECTIONS: usize = 2;

/// Request descriptors budgeted per connection.
///
/// The descriptor pool is shared; nothing stops one connection from using
/// another connection's share.
pub const GQ_QUEUE_SIZE: usize = 4;

/// Total number of request descriptors in the shared pool.
pub const GQ_REQ_BLOCKS: usize = GQ_MAX_CONNECTIONS * GQ_QUEUE_SIZE;

/// Size of the payload arena (bytes) holding write and notify/indicate values.
pub const GQ_HEAP_SIZE: usize = 256;

// Firmware example

/// Characteristic value notified by the example firmware (bytes).
pub const DEMO_NOTIFY_LEN: usize = 20;

/// Interval between example notifications (ms).
pub const DEMO_NOTIFY_INTERVAL_MS: u64 = 100;
