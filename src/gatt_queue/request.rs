//! GATT request types accepted by the queue.
//!
//! Parameter structs mirror the SoftDevice `ble_gattc_*` / `ble_gatts_*`
//! parameter blocks, minus the raw value pointers: payload bytes travel as
//! the generic `P` of [`GattRequest`]. Callers submit `GattRequest<&[u8]>`;
//! the queue stores buffered copies whose payload lives in its own arena.

use super::controller::NrfError;

/// Connection handle value that never identifies a live link.
pub const BLE_CONN_HANDLE_INVALID: u16 = 0xFFFF;

/// Bluetooth UUID as the SoftDevice represents it (16-bit value + UUID type).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Uuid {
    /// 16-bit UUID value, or octets 12-13 of a vendor-specific 128-bit UUID.
    pub uuid: u16,
    /// UUID type (1 = Bluetooth SIG, 2+ = vendor-specific table index).
    pub uuid_type: u8,
}

/// Inclusive attribute handle range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandleRange {
    pub start_handle: u16,
    pub end_handle: u16,
}

/// GATT write operation (`BLE_GATT_OP_*`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WriteOp {
    /// Write Request, acknowledged by the peer.
    WriteReq = 0x01,
    /// Write Command, unacknowledged.
    WriteCmd = 0x02,
    /// Signed Write Command.
    SignedWriteCmd = 0x03,
    /// Prepare Write Request.
    PrepWriteReq = 0x04,
    /// Execute Write Request.
    ExecWriteReq = 0x05,
}

/// GATTC write parameters (value excluded).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WriteParams {
    pub write_op: WriteOp,
    /// Execute-write flags (`BLE_GATT_EXEC_WRITE_FLAG_*`).
    pub flags: u8,
    pub handle: u16,
    pub offset: u16,
}

/// Handle value operation type (`BLE_GATT_HVX_*`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HvxType {
    Notification = 0x01,
    Indication = 0x02,
}

/// GATTS notification/indication parameters (data excluded).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HvxParams {
    /// Characteristic value handle.
    pub handle: u16,
    pub hvx_type: HvxType,
    pub offset: u16,
}

/// One GATT operation. `P` is the payload carried by writes and
/// notifications/indications; every other kind is self-contained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GattRequest<P> {
    /// GATTC Read Request.
    GattcRead { handle: u16, offset: u16 },
    /// GATTC Write (request or command).
    GattcWrite { params: WriteParams, value: P },
    /// GATTC Primary Service Discovery.
    SrvDiscovery { start_handle: u16, srvc_uuid: Uuid },
    /// GATTC Characteristic Discovery.
    CharDiscovery(HandleRange),
    /// GATTC Characteristic Descriptor Discovery.
    DescDiscovery(HandleRange),
    /// GATTS Handle Value Notification or Indication.
    GattsHvx { params: HvxParams, data: P },
}

/// Payload-free discriminant of [`GattRequest`], used for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestKind {
    GattcRead,
    GattcWrite,
    SrvDiscovery,
    CharDiscovery,
    DescDiscovery,
    GattsHvx,
}

impl<P> GattRequest<P> {
    pub fn kind(&self) -> RequestKind {
        match self {
            GattRequest::GattcRead { .. } => RequestKind::GattcRead,
            GattRequest::GattcWrite { .. } => RequestKind::GattcWrite,
            GattRequest::SrvDiscovery { .. } => RequestKind::SrvDiscovery,
            GattRequest::CharDiscovery(_) => RequestKind::CharDiscovery,
            GattRequest::DescDiscovery(_) => RequestKind::DescDiscovery,
            GattRequest::GattsHvx { .. } => RequestKind::GattsHvx,
        }
    }

    /// The payload, for the kinds that carry one.
    pub fn payload(&self) -> Option<&P> {
        match self {
            GattRequest::GattcWrite { value, .. } => Some(value),
            GattRequest::GattsHvx { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Rebuild the request with its payload converted by `f`.
    ///
    /// `f` only runs for writes and notifications/indications.
    pub fn try_map_payload<Q, E>(
        self,
        f: impl FnOnce(P) -> Result<Q, E>,
    ) -> Result<GattRequest<Q>, E> {
        Ok(match self {
            GattRequest::GattcRead { handle, offset } => GattRequest::GattcRead { handle, offset },
            GattRequest::GattcWrite { params, value } => GattRequest::GattcWrite {
                params,
                value: f(value)?,
            },
            GattRequest::SrvDiscovery {
                start_handle,
                srvc_uuid,
            } => GattRequest::SrvDiscovery {
                start_handle,
                srvc_uuid,
            },
            GattRequest::CharDiscovery(range) => GattRequest::CharDiscovery(range),
            GattRequest::DescDiscovery(range) => GattRequest::DescDiscovery(range),
            GattRequest::GattsHvx { params, data } => GattRequest::GattsHvx {
                params,
                data: f(data)?,
            },
        })
    }

    /// Infallible form of [`try_map_payload`](Self::try_map_payload).
    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> GattRequest<Q> {
        match self.try_map_payload::<Q, core::convert::Infallible>(|p| Ok(f(p))) {
            Ok(req) => req,
            Err(never) => match never {},
        }
    }
}

/// Error callback: `(conn_handle, error, context)`.
pub type ErrorCallback = fn(conn_handle: u16, error: NrfError, ctx: usize);

/// Error handler attached to a request.
///
/// Invoked exactly once if the SoftDevice rejects (or truncates) the
/// request, never on success. The callback gets no access to the queue, so
/// it cannot submit into the instance that is calling it.
#[derive(Clone, Copy, Debug)]
pub struct ErrorHandler {
    pub cb: ErrorCallback,
    /// Opaque value handed back to `cb`.
    pub ctx: usize,
}

impl ErrorHandler {
    pub const fn new(cb: ErrorCallback, ctx: usize) -> Self {
        Self { cb, ctx }
    }

    pub(crate) fn notify(&self, conn_handle: u16, error: NrfError) {
        (self.cb)(conn_handle, error, self.ctx)
    }
}

/// A request as submitted by a caller.
#[derive(Clone, Copy, Debug)]
pub struct Request<'a> {
    pub op: GattRequest<&'a [u8]>,
    pub error_handler: Option<ErrorHandler>,
}

impl<'a> Request<'a> {
    pub const fn new(op: GattRequest<&'a [u8]>) -> Self {
        Self {
            op,
            error_handler: None,
        }
    }

    pub const fn gattc_read(handle: u16, offset: u16) -> Self {
        Self::new(GattRequest::GattcRead { handle, offset })
    }

    pub const fn gattc_write(params: WriteParams, value: &'a [u8]) -> Self {
        Self::new(GattRequest::GattcWrite { params, value })
    }

    pub const fn srv_discovery(start_handle: u16, srvc_uuid: Uuid) -> Self {
        Self::new(GattRequest::SrvDiscovery {
            start_handle,
            srvc_uuid,
        })
    }

    pub const fn char_discovery(range: HandleRange) -> Self {
        Self::new(GattRequest::CharDiscovery(range))
    }

    pub const fn desc_discovery(range: HandleRange) -> Self {
        Self::new(GattRequest::DescDiscovery(range))
    }

    pub const fn gatts_hvx(params: HvxParams, data: &'a [u8]) -> Self {
        Self::new(GattRequest::GattsHvx { params, data })
    }

    /// Attach an error handler.
    pub const fn on_error(mut self, cb: ErrorCallback, ctx: usize) -> Self {
        self.error_handler = Some(ErrorHandler::new(cb, ctx));
        self
    }
}
