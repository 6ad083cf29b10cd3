//! The SoftDevice seam.
//!
//! [`Controller`] is the synchronous "accept or busy" contract the queue
//! dispatches against. On target it is implemented over the raw
//! `sd_ble_gattc_*` / `sd_ble_gatts_hvx` SVCs; host tests script it.

use super::request::{HandleRange, HvxParams, Uuid, WriteParams};

/// SoftDevice error codes (`nrf_error.h` and the BLE stack ranges).
///
/// `NRF_SUCCESS` has no variant: success is `Ok(())`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NrfError {
    SvcHandlerMissing,
    SoftdeviceNotEnabled,
    Internal,
    NoMem,
    NotFound,
    NotSupported,
    InvalidParam,
    InvalidState,
    InvalidLength,
    InvalidFlags,
    InvalidData,
    /// Also used by the queue when a notification/indication was truncated.
    DataSize,
    Timeout,
    Null,
    Forbidden,
    InvalidAddr,
    /// Transient: the SoftDevice cannot take the procedure right now.
    Busy,
    ConnCount,
    Resources,
    /// `BLE_ERROR_INVALID_CONN_HANDLE`
    InvalidConnHandle,
    /// `BLE_ERROR_INVALID_ATTR_HANDLE`
    InvalidAttrHandle,
    /// `BLE_ERROR_GATTS_SYS_ATTR_MISSING`
    SysAttrMissing,
    /// Any other raw code.
    Other(u32),
}

const NRF_SUCCESS: u32 = 0;

impl NrfError {
    /// Map a raw SVC return value; `NRF_SUCCESS` becomes `Ok(())`.
    pub fn check(raw: u32) -> Result<(), NrfError> {
        if raw == NRF_SUCCESS {
            return Ok(());
        }
        Err(match raw {
            1 => NrfError::SvcHandlerMissing,
            2 => NrfError::SoftdeviceNotEnabled,
            3 => NrfError::Internal,
            4 => NrfError::NoMem,
            5 => NrfError::NotFound,
            6 => NrfError::NotSupported,
            7 => NrfError::InvalidParam,
            8 => NrfError::InvalidState,
            9 => NrfError::InvalidLength,
            10 => NrfError::InvalidFlags,
            11 => NrfError::InvalidData,
            12 => NrfError::DataSize,
            13 => NrfError::Timeout,
            14 => NrfError::Null,
            15 => NrfError::Forbidden,
            16 => NrfError::InvalidAddr,
            17 => NrfError::Busy,
            18 => NrfError::ConnCount,
            19 => NrfError::Resources,
            0x3002 => NrfError::InvalidConnHandle,
            0x3003 => NrfError::InvalidAttrHandle,
            0x3401 => NrfError::SysAttrMissing,
            other => NrfError::Other(other),
        })
    }

    /// The raw code, as passed to C-side error handlers.
    pub fn to_raw(self) -> u32 {
        match self {
            NrfError::SvcHandlerMissing => 1,
            NrfError::SoftdeviceNotEnabled => 2,
            NrfError::Internal => 3,
            NrfError::NoMem => 4,
            NrfError::NotFound => 5,
            NrfError::NotSupported => 6,
            NrfError::InvalidParam => 7,
            NrfError::InvalidState => 8,
            NrfError::InvalidLength => 9,
            NrfError::InvalidFlags => 10,
            NrfError::InvalidData => 11,
            NrfError::DataSize => 12,
            NrfError::Timeout => 13,
            NrfError::Null => 14,
            NrfError::Forbidden => 15,
            NrfError::InvalidAddr => 16,
            NrfError::Busy => 17,
            NrfError::ConnCount => 18,
            NrfError::Resources => 19,
            NrfError::InvalidConnHandle => 0x3002,
            NrfError::InvalidAttrHandle => 0x3003,
            NrfError::SysAttrMissing => 0x3401,
            NrfError::Other(raw) => raw,
        }
    }
}

/// Synchronous GATT procedures offered by the BLE controller.
///
/// Each call either starts the procedure (`Ok`), refuses it for now
/// (`Err(NrfError::Busy)`), or rejects it for good (any other error).
/// Completion of a started procedure is signalled later as a BLE event.
pub trait Controller {
    fn gattc_read(&mut self, conn_handle: u16, handle: u16, offset: u16) -> Result<(), NrfError>;

    fn gattc_write(
        &mut self,
        conn_handle: u16,
        params: &WriteParams,
        value: &[u8],
    ) -> Result<(), NrfError>;

    fn gattc_primary_services_discover(
        &mut self,
        conn_handle: u16,
        start_handle: u16,
        srvc_uuid: &Uuid,
    ) -> Result<(), NrfError>;

    fn gattc_characteristics_discover(
        &mut self,
        conn_handle: u16,
        range: &HandleRange,
    ) -> Result<(), NrfError>;

    fn gattc_descriptors_discover(
        &mut self,
        conn_handle: u16,
        range: &HandleRange,
    ) -> Result<(), NrfError>;

    /// Notify or indicate. On success returns how many bytes of `data`
    /// the SoftDevice actually queued.
    fn gatts_hvx(
        &mut self,
        conn_handle: u16,
        params: &HvxParams,
        data: &[u8],
    ) -> Result<u16, NrfError>;
}

impl<C: Controller + ?Sized> Controller for &mut C {
    fn gattc_read(&mut self, conn_handle: u16, handle: u16, offset: u16) -> Result<(), NrfError> {
        (**self).gattc_read(conn_handle, handle, offset)
    }

    fn gattc_write(
        &mut self,
        conn_handle: u16,
        params: &WriteParams,
        value: &[u8],
    ) -> Result<(), NrfError> {
        (**self).gattc_write(conn_handle, params, value)
    }

    fn gattc_primary_services_discover(
        &mut self,
        conn_handle: u16,
        start_handle: u16,
        srvc_uuid: &Uuid,
    ) -> Result<(), NrfError> {
        (**self).gattc_primary_services_discover(conn_handle, start_handle, srvc_uuid)
    }

    fn gattc_characteristics_discover(
        &mut self,
        conn_handle: u16,
        range: &HandleRange,
    ) -> Result<(), NrfError> {
        (**self).gattc_characteristics_discover(conn_handle, range)
    }

    fn gattc_descriptors_discover(
        &mut self,
        conn_handle: u16,
        range: &HandleRange,
    ) -> Result<(), NrfError> {
        (**self).gattc_descriptors_discover(conn_handle, range)
    }

    fn gatts_hvx(
        &mut self,
        conn_handle: u16,
        params: &HvxParams,
        data: &[u8],
    ) -> Result<u16, NrfError> {
        (**self).gatts_hvx(conn_handle, params, data)
    }
}
