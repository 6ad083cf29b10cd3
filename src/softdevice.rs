//! [`Controller`] backed by the Nordic S140 SoftDevice.
//!
//! Thin wrappers over the `sd_ble_gattc_*` / `sd_ble_gatts_hvx` SVCs. The
//! parameter structs are built on the stack for the duration of the call;
//! the SoftDevice copies what it keeps.

use nrf_softdevice::raw;
use nrf_softdevice::Softdevice;

use crate::gatt_queue::{Controller, HandleRange, HvxParams, NrfError, Uuid, WriteParams};

/// Issues GATT procedures through the SoftDevice.
///
/// Construction takes the `&'static Softdevice` so that no SVC can be made
/// before the stack is enabled.
#[derive(Clone, Copy, Debug)]
pub struct SoftDeviceController {
    _enabled: (),
}

impl SoftDeviceController {
    pub fn new(_sd: &'static Softdevice) -> Self {
        Self { _enabled: () }
    }
}

fn handle_range(range: &HandleRange) -> raw::ble_gattc_handle_range_t {
    raw::ble_gattc_handle_range_t {
        start_handle: range.start_handle,
        end_handle: range.end_handle,
    }
}

impl Controller for SoftDeviceController {
    fn gattc_read(&mut self, conn_handle: u16, handle: u16, offset: u16) -> Result<(), NrfError> {
        let ret = unsafe { raw::sd_ble_gattc_read(conn_handle, handle, offset) };
        NrfError::check(ret)
    }

    fn gattc_write(
        &mut self,
        conn_handle: u16,
        params: &WriteParams,
        value: &[u8],
    ) -> Result<(), NrfError> {
        let len = u16::try_from(value.len()).map_err(|_| NrfError::DataSize)?;
        let write_params = raw::ble_gattc_write_params_t {
            write_op: params.write_op as u8,
            flags: params.flags,
            handle: params.handle,
            offset: params.offset,
            len,
            p_value: value.as_ptr(),
        };
        let ret = unsafe { raw::sd_ble_gattc_write(conn_handle, &write_params) };
        NrfError::check(ret)
    }

    fn gattc_primary_services_discover(
        &mut self,
        conn_handle: u16,
        start_handle: u16,
        srvc_uuid: &Uuid,
    ) -> Result<(), NrfError> {
        let uuid = raw::ble_uuid_t {
            uuid: srvc_uuid.uuid,
            type_: srvc_uuid.uuid_type,
        };
        let ret =
            unsafe { raw::sd_ble_gattc_primary_services_discover(conn_handle, start_handle, &uuid) };
        NrfError::check(ret)
    }

    fn gattc_characteristics_discover(
        &mut self,
        conn_handle: u16,
        range: &HandleRange,
    ) -> Result<(), NrfError> {
        let range = handle_range(range);
        let ret = unsafe { raw::sd_ble_gattc_characteristics_discover(conn_handle, &range) };
        NrfError::check(ret)
    }

    fn gattc_descriptors_discover(
        &mut self,
        conn_handle: u16,
        range: &HandleRange,
    ) -> Result<(), NrfError> {
        let range = handle_range(range);
        let ret = unsafe { raw::sd_ble_gattc_descriptors_discover(conn_handle, &range) };
        NrfError::check(ret)
    }

    fn gatts_hvx(
        &mut self,
        conn_handle: u16,
        params: &HvxParams,
        data: &[u8],
    ) -> Result<u16, NrfError> {
        // In: bytes offered. Out: bytes the SoftDevice queued.
        let mut len = u16::try_from(data.len()).map_err(|_| NrfError::DataSize)?;
        let hvx_params = raw::ble_gatts_hvx_params_t {
            handle: params.handle,
            type_: params.hvx_type as u8,
            offset: params.offset,
            p_len: &mut len,
            p_data: data.as_ptr(),
        };
        let ret = unsafe { raw::sd_ble_gatts_hvx(conn_handle, &hvx_params) };
        NrfError::check(ret)?;
        Ok(len)
    }
}
