//! Bounded per-connection GATT request queue for nRF52 SoftDevice firmware.
//!
//! The SoftDevice answers `NRF_ERROR_BUSY` whenever a GATT procedure is
//! already running on a link. This crate buffers such requests per
//! connection in statically sized storage and replays them, in order, when
//! a BLE event shows the link may be free again.
//!
//! The queue logic is pure and runs on the host (`cargo test --lib`).
//! The `embedded` feature adds the SoftDevice binding and the example
//! firmware in main.rs.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod config;
pub mod error;
pub mod gatt_queue;

#[cfg(feature = "embedded")]
pub mod softdevice;

pub use error::{AllocError, Error};
pub use gatt_queue::{
    BleEvent, Controller, DefaultGattQueue, GattQueue, GqStats, NrfError, Request, Submitted,
};
