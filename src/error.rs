//! Error types for the GATT queue.
//!
//! We avoid `alloc` - all error variants carry no data and are `Copy`.
//! Controller status codes live in [`crate::gatt_queue::NrfError`]; they are
//! never returned from the queue API, only handed to request error handlers.

use core::fmt;

/// Errors returned synchronously by the queue entry points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Connection handle is not registered, is the invalid handle, or a
    /// payload does not fit a 16-bit ATT length. No side effects.
    InvalidParam,

    /// Every slot is taken by a distinct live connection.
    OutOfSlots,

    /// The descriptor pool or the payload arena is exhausted. Nothing was
    /// buffered; the caller may retry later.
    OutOfMemory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidParam => f.write_str("invalid parameter"),
            Error::OutOfSlots => f.write_str("no free connection slot"),
            Error::OutOfMemory => f.write_str("request storage exhausted"),
        }
    }
}

/// Allocator-level failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AllocError {
    /// No free request descriptor.
    OutOfDescriptors,
    /// No contiguous region of the requested size in the payload arena.
    OutOfMemory,
}

// Convenience conversions

impl From<AllocError> for Error {
    fn from(_: AllocError) -> Self {
        Error::OutOfMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_errors_surface_as_out_of_memory() {
        assert_eq!(Error::from(AllocError::OutOfDescriptors), Error::OutOfMemory);
        assert_eq!(Error::from(AllocError::OutOfMemory), Error::OutOfMemory);
    }

    #[test]
    fn display_is_human_readable() {
        use std::string::ToString;

        assert_eq!(Error::OutOfSlots.to_string(), "no free connection slot");
        assert_eq!(Error::InvalidParam.to_string(), "invalid parameter");
    }
}
