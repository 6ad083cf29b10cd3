//! Hand one request to the SoftDevice and classify the answer.

use super::controller::{Controller, NrfError};
use super::request::{ErrorHandler, GattRequest, HvxParams, BLE_CONN_HANDLE_INVALID};
use super::GattQueue;

/// Synchronous result of offering a request to the SoftDevice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Outcome {
    /// Not taken; the same request must be offered again later.
    Busy,
    /// Taken or rejected for good. Any failure has been reported.
    Resolved,
}

/// Issue the SoftDevice call for `op` on `conn_handle`.
///
/// A notification/indication that the SoftDevice accepted but shortened is
/// a failure (`DataSize`), never a success.
pub(crate) fn request_process<C: Controller + ?Sized>(
    controller: &mut C,
    conn_handle: u16,
    op: &GattRequest<&[u8]>,
    error_handler: Option<&ErrorHandler>,
) -> Outcome {
    let result = match *op {
        GattRequest::GattcRead { handle, offset } => {
            debug!("GATTC read request");
            controller.gattc_read(conn_handle, handle, offset)
        }
        GattRequest::GattcWrite { ref params, value } => {
            debug!("GATTC write request");
            controller.gattc_write(conn_handle, params, value)
        }
        GattRequest::SrvDiscovery {
            start_handle,
            ref srvc_uuid,
        } => {
            debug!("GATTC primary services discovery request");
            controller.gattc_primary_services_discover(conn_handle, start_handle, srvc_uuid)
        }
        GattRequest::CharDiscovery(ref range) => {
            debug!("GATTC characteristics discovery request");
            controller.gattc_characteristics_discover(conn_handle, range)
        }
        GattRequest::DescDiscovery(ref range) => {
            debug!("GATTC characteristic descriptors discovery request");
            controller.gattc_descriptors_discover(conn_handle, range)
        }
        GattRequest::GattsHvx { ref params, data } => {
            debug!("GATTS notification or indication");
            hvx(controller, conn_handle, params, data)
        }
    };

    match result {
        Err(NrfError::Busy) => {
            debug!("SoftDevice busy, GATT procedure will be attempted again later");
            Outcome::Busy
        }
        Ok(()) => {
            debug!(
                "GATT procedure {} succeeded on connection {}",
                op.kind(),
                conn_handle
            );
            Outcome::Resolved
        }
        Err(err) => {
            debug!(
                "GATT procedure {} failed on connection {}: {}",
                op.kind(),
                conn_handle,
                err
            );
            if let Some(handler) = error_handler {
                handler.notify(conn_handle, err);
            }
            Outcome::Resolved
        }
    }
}

fn hvx<C: Controller + ?Sized>(
    controller: &mut C,
    conn_handle: u16,
    params: &HvxParams,
    data: &[u8],
) -> Result<(), NrfError> {
    let requested = u16::try_from(data.len()).map_err(|_| NrfError::DataSize)?;
    let written = controller.gatts_hvx(conn_handle, params, data)?;
    if written != requested {
        warn!(
            "HVX on connection {} truncated: {} of {} bytes",
            conn_handle,
            written,
            requested
        );
        return Err(NrfError::DataSize);
    }
    Ok(())
}

impl<C, const MAX_CONNS: usize, const MAX_REQS: usize, const HEAP_SIZE: usize>
    GattQueue<C, MAX_CONNS, MAX_REQS, HEAP_SIZE>
where
    C: Controller,
{
    /// Offer the head of `slot`'s pending list to the SoftDevice.
    ///
    /// On `Busy` the head stays in place. Otherwise it is unlinked and its
    /// descriptor and payload are released. Requests behind the head are
    /// never touched.
    pub fn try_process(&mut self, slot: usize) {
        let (Some(&conn_handle), Some(queue)) =
            (self.conn_handles.get(slot), self.queues.get_mut(slot))
        else {
            return;
        };
        if conn_handle == BLE_CONN_HANDLE_INVALID {
            return;
        }
        let Some(head) = queue.front() else {
            return;
        };
        let Some(entry) = self.pool.get(head) else {
            return;
        };

        let arena = &self.arena;
        let op = entry
            .op
            .map_payload(|payload| payload.map_or(&[][..], |p| arena.get(p)));
        let outcome = request_process(
            &mut self.controller,
            conn_handle,
            &op,
            entry.error_handler.as_ref(),
        );
        if outcome == Outcome::Busy {
            return;
        }

        queue.pop_front(&mut self.pool);
        Self::release(&mut self.pool, &mut self.arena, head);
    }
}
