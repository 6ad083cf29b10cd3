//! BLE event classification.
//!
//! Only the event id and the connection handle matter to the queue. Event
//! ids follow the SoftDevice numbering: a GAP disconnect invalidates the
//! link, any GATTC or GATTS event means the SoftDevice may have capacity
//! again on that link, everything else is ignored.

pub const BLE_GAP_EVT_CONNECTED: u16 = 0x10;
pub const BLE_GAP_EVT_DISCONNECTED: u16 = 0x11;

pub const BLE_GATTC_EVT_BASE: u16 = 0x30;
pub const BLE_GATTC_EVT_LAST: u16 = 0x4F;
pub const BLE_GATTC_EVT_READ_RSP: u16 = 0x36;
pub const BLE_GATTC_EVT_WRITE_RSP: u16 = 0x38;

pub const BLE_GATTS_EVT_BASE: u16 = 0x50;
pub const BLE_GATTS_EVT_LAST: u16 = 0x6F;
pub const BLE_GATTS_EVT_WRITE: u16 = 0x50;
pub const BLE_GATTS_EVT_HVC: u16 = 0x53;
pub const BLE_GATTS_EVT_HVN_TX_COMPLETE: u16 = 0x57;

/// The part of a SoftDevice BLE event the queue looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BleEvent {
    pub id: u16,
    pub conn_handle: u16,
}

/// What an event means for one connection's queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventCategory {
    /// The link is gone; its pending requests must be purged.
    Invalidated(u16),
    /// The SoftDevice may accept the next request for this link.
    MayBeReady(u16),
    Irrelevant,
}

impl BleEvent {
    pub const fn new(id: u16, conn_handle: u16) -> Self {
        Self { id, conn_handle }
    }

    pub const fn disconnected(conn_handle: u16) -> Self {
        Self::new(BLE_GAP_EVT_DISCONNECTED, conn_handle)
    }

    pub fn category(&self) -> EventCategory {
        match self.id {
            BLE_GAP_EVT_DISCONNECTED => EventCategory::Invalidated(self.conn_handle),
            BLE_GATTC_EVT_BASE..=BLE_GATTC_EVT_LAST | BLE_GATTS_EVT_BASE..=BLE_GATTS_EVT_LAST => {
                EventCategory::MayBeReady(self.conn_handle)
            }
            _ => EventCategory::Irrelevant,
        }
    }
}
