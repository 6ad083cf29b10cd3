//! Unit tests for the GATT queue.
//!
//! These run on the host against a scripted controller that records every
//! SoftDevice call it receives.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::vec::Vec;

use super::event::{BLE_GAP_EVT_CONNECTED, BLE_GATTC_EVT_READ_RSP, BLE_GATTS_EVT_WRITE};
use super::*;

// ═══════════════════════════════════════════════════════════════════════════
// Test doubles
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug)]
enum Reply {
    Accept,
    Fail(NrfError),
    /// HVX accepted with this many bytes queued.
    Written(u16),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Call {
    Read(u16, u16, u16),
    Write(u16, u16, Vec<u8>),
    SrvDisc(u16, u16, Uuid),
    CharDisc(u16, HandleRange),
    DescDisc(u16, HandleRange),
    Hvx(u16, u16, Vec<u8>),
}

/// Replays scripted replies in order; accepts once the script runs out.
#[derive(Default)]
struct ScriptedController {
    script: VecDeque<Reply>,
    calls: Vec<Call>,
}

impl ScriptedController {
    fn next(&mut self) -> Reply {
        self.script.pop_front().unwrap_or(Reply::Accept)
    }

    fn plain(&mut self, call: Call) -> Result<(), NrfError> {
        self.calls.push(call);
        match self.next() {
            Reply::Fail(e) => Err(e),
            Reply::Accept | Reply::Written(_) => Ok(()),
        }
    }
}

impl Controller for ScriptedController {
    fn gattc_read(&mut self, conn_handle: u16, handle: u16, offset: u16) -> Result<(), NrfError> {
        self.plain(Call::Read(conn_handle, handle, offset))
    }

    fn gattc_write(
        &mut self,
        conn_handle: u16,
        params: &WriteParams,
        value: &[u8],
    ) -> Result<(), NrfError> {
        self.plain(Call::Write(conn_handle, params.handle, value.to_vec()))
    }

    fn gattc_primary_services_discover(
        &mut self,
        conn_handle: u16,
        start_handle: u16,
        srvc_uuid: &Uuid,
    ) -> Result<(), NrfError> {
        self.plain(Call::SrvDisc(conn_handle, start_handle, *srvc_uuid))
    }

    fn gattc_characteristics_discover(
        &mut self,
        conn_handle: u16,
        range: &HandleRange,
    ) -> Result<(), NrfError> {
        self.plain(Call::CharDisc(conn_handle, *range))
    }

    fn gattc_descriptors_discover(
        &mut self,
        conn_handle: u16,
        range: &HandleRange,
    ) -> Result<(), NrfError> {
        self.plain(Call::DescDisc(conn_handle, *range))
    }

    fn gatts_hvx(
        &mut self,
        conn_handle: u16,
        params: &HvxParams,
        data: &[u8],
    ) -> Result<u16, NrfError> {
        self.calls
            .push(Call::Hvx(conn_handle, params.handle, data.to_vec()));
        match self.next() {
            Reply::Accept => Ok(data.len() as u16),
            Reply::Written(n) => Ok(n),
            Reply::Fail(e) => Err(e),
        }
    }
}

thread_local! {
    static ERRORS: RefCell<Vec<(u16, NrfError, usize)>> = const { RefCell::new(Vec::new()) };
}

fn record_error(conn_handle: u16, error: NrfError, ctx: usize) {
    ERRORS.with(|e| e.borrow_mut().push((conn_handle, error, ctx)));
}

fn errors() -> Vec<(u16, NrfError, usize)> {
    ERRORS.with(|e| e.borrow().clone())
}

type TestQueue = GattQueue<ScriptedController, 3, 8, 64>;

const CONN_1: u16 = 42;
const CONN_2: u16 = 44;
const ATTR_HANDLE: u16 = 0xCAFE;
const OFFSET: u16 = 17;

fn queue(script: &[Reply]) -> TestQueue {
    let mut q = TestQueue::new(ScriptedController::default());
    q.controller_mut().script.extend(script.iter().copied());
    q
}

fn write_params() -> WriteParams {
    WriteParams {
        write_op: WriteOp::WriteReq,
        flags: 0,
        handle: ATTR_HANDLE,
        offset: OFFSET,
    }
}

fn hvx_params() -> HvxParams {
    HvxParams {
        handle: ATTR_HANDLE,
        hvx_type: HvxType::Indication,
        offset: OFFSET,
    }
}

fn gatts_evt(conn_handle: u16) -> BleEvent {
    BleEvent::new(BLE_GATTS_EVT_WRITE, conn_handle)
}

// ═══════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn register_fills_slots_in_order_then_fails() {
    let mut q = queue(&[]);
    assert_eq!(q.register(42), Ok(0));
    assert_eq!(q.register(43), Ok(1));
    assert_eq!(q.register(44), Ok(2));
    assert_eq!(q.register(0), Err(Error::OutOfSlots));

    // Existing registrations are untouched.
    assert_eq!(q.find(42), Some(0));
    assert_eq!(q.find(43), Some(1));
    assert_eq!(q.find(44), Some(2));
    assert_eq!(q.find(0), None);
}

#[test]
fn register_twice_returns_same_slot_even_when_full() {
    let mut q = queue(&[]);
    for h in [42, 43, 44] {
        q.register(h).unwrap();
    }
    assert_eq!(q.register(43), Ok(1));
    assert_eq!(q.stats().connections, 3);
    assert_eq!(q.stats().requests_in_use, 0);
}

#[test]
fn invalid_handle_cannot_be_registered() {
    let mut q = queue(&[]);
    assert_eq!(q.register(BLE_CONN_HANDLE_INVALID), Err(Error::InvalidParam));
    assert_eq!(q.find(BLE_CONN_HANDLE_INVALID), None);
}

// ═══════════════════════════════════════════════════════════════════════════
// Submission
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn submit_to_unregistered_connection_is_rejected() {
    let mut q = queue(&[]);
    q.register(CONN_1).unwrap();
    let res = q.submit(CONN_2, Request::gattc_read(ATTR_HANDLE, OFFSET));
    assert_eq!(res, Err(Error::InvalidParam));
    assert!(q.controller().calls.is_empty());
}

#[test]
fn oversized_payload_is_rejected() {
    let mut q = queue(&[]);
    q.register(CONN_1).unwrap();
    let big = std::vec![0u8; u16::MAX as usize + 1];
    let res = q.submit(CONN_1, Request::gattc_write(write_params(), &big));
    assert_eq!(res, Err(Error::InvalidParam));
    assert!(q.controller().calls.is_empty());
}

#[test]
fn read_accepted_without_buffering() {
    let mut q = queue(&[]);
    q.register(CONN_1).unwrap();
    let res = q.submit(
        CONN_1,
        Request::gattc_read(ATTR_HANDLE, OFFSET).on_error(record_error, 1),
    );
    assert_eq!(res, Ok(Submitted::Accepted));
    assert_eq!(
        q.controller().calls,
        [Call::Read(CONN_1, ATTR_HANDLE, OFFSET)]
    );
    assert!(errors().is_empty());
    assert_eq!(q.stats().requests_in_use, 0);
}

#[test]
fn immediate_failure_reported_before_submit_returns() {
    let mut q = queue(&[Reply::Fail(NrfError::InvalidState)]);
    q.register(CONN_1).unwrap();
    let res = q.submit(
        CONN_1,
        Request::gattc_read(ATTR_HANDLE, OFFSET).on_error(record_error, 5),
    );
    assert_eq!(res, Ok(Submitted::Accepted));
    assert_eq!(errors(), [(CONN_1, NrfError::InvalidState, 5)]);
    assert_eq!(q.pending_len(CONN_1), Some(0));
}

#[test]
fn busy_read_is_retried_on_gatt_event() {
    let mut q = queue(&[Reply::Fail(NrfError::Busy)]);
    q.register(CONN_1).unwrap();
    let res = q.submit(
        CONN_1,
        Request::gattc_read(ATTR_HANDLE, OFFSET).on_error(record_error, 0),
    );
    assert_eq!(res, Ok(Submitted::Buffered));
    assert_eq!(q.pending_len(CONN_1), Some(1));
    assert_eq!(q.stats().requests_in_use, 1);

    q.on_ble_evt(&BleEvent::new(BLE_GATTC_EVT_READ_RSP, CONN_1));
    assert_eq!(q.pending_len(CONN_1), Some(0));
    assert_eq!(q.stats().requests_in_use, 0);
    assert_eq!(q.controller().calls.len(), 2);
    assert!(errors().is_empty());
}

#[test]
fn buffered_failure_reported_from_event_path() {
    let mut q = queue(&[
        Reply::Fail(NrfError::Busy),
        Reply::Fail(NrfError::InvalidState),
    ]);
    q.register(CONN_1).unwrap();
    q.submit(
        CONN_1,
        Request::gattc_write(write_params(), b"testdata").on_error(record_error, 9),
    )
    .unwrap();
    assert!(errors().is_empty());

    q.on_ble_evt(&gatts_evt(CONN_1));
    assert_eq!(errors(), [(CONN_1, NrfError::InvalidState, 9)]);
    assert_eq!(q.stats(), GqStats {
        connections: 1,
        ..GqStats::default()
    });
}

#[test]
fn buffered_write_replays_copied_payload() {
    let mut q = queue(&[Reply::Fail(NrfError::Busy), Reply::Fail(NrfError::Busy)]);
    q.register(CONN_1).unwrap();
    {
        let value = std::vec::Vec::from(*b"testdata");
        q.submit(CONN_1, Request::gattc_write(write_params(), &value))
            .unwrap();
        assert_eq!(q.stats().payload_bytes_in_use, 8);
    }

    q.on_ble_evt(&gatts_evt(CONN_1));
    assert_eq!(q.pending_len(CONN_1), Some(1));
    q.on_ble_evt(&gatts_evt(CONN_1));
    assert_eq!(q.pending_len(CONN_1), Some(0));

    let expected = Call::Write(CONN_1, ATTR_HANDLE, b"testdata".to_vec());
    assert_eq!(q.controller().calls, [expected.clone(), expected.clone(), expected]);
    assert_eq!(q.stats().payload_bytes_in_use, 0);
}

#[test]
fn discovery_requests_busy_busy_success() {
    let uuid = Uuid {
        uuid: 0xBADE,
        uuid_type: 0x78,
    };
    let chars = HandleRange {
        start_handle: 0xAAAA,
        end_handle: 0xBBBB,
    };
    let descs = HandleRange {
        start_handle: 0xCCCC,
        end_handle: 0xDDDD,
    };
    let cases = [
        (Request::srv_discovery(ATTR_HANDLE, uuid), Call::SrvDisc(CONN_1, ATTR_HANDLE, uuid)),
        (Request::char_discovery(chars), Call::CharDisc(CONN_1, chars)),
        (Request::desc_discovery(descs), Call::DescDisc(CONN_1, descs)),
    ];

    for (req, call) in cases {
        let mut q = queue(&[Reply::Fail(NrfError::Busy), Reply::Fail(NrfError::Busy)]);
        q.register(CONN_1).unwrap();
        assert_eq!(q.submit(CONN_1, req), Ok(Submitted::Buffered));
        q.on_ble_evt(&gatts_evt(CONN_1));
        q.on_ble_evt(&gatts_evt(CONN_1));
        assert_eq!(q.controller().calls, [call.clone(), call.clone(), call]);
        assert_eq!(q.pending_len(CONN_1), Some(0));
    }
}

#[test]
fn second_request_waits_behind_buffered_head() {
    let mut q = queue(&[Reply::Fail(NrfError::Busy)]);
    q.register(CONN_1).unwrap();
    assert_eq!(
        q.submit(CONN_1, Request::gattc_read(1, 0)),
        Ok(Submitted::Buffered)
    );
    assert_eq!(
        q.submit(CONN_1, Request::gattc_read(2, 0)),
        Ok(Submitted::Buffered)
    );
    // The second submit never reached the SoftDevice.
    assert_eq!(q.controller().calls, [Call::Read(CONN_1, 1, 0)]);

    q.on_ble_evt(&gatts_evt(CONN_1));
    assert_eq!(q.pending_len(CONN_1), Some(1));
    q.on_ble_evt(&gatts_evt(CONN_1));
    assert_eq!(
        q.controller().calls,
        [
            Call::Read(CONN_1, 1, 0),
            Call::Read(CONN_1, 1, 0),
            Call::Read(CONN_1, 2, 0)
        ]
    );
}

#[test]
fn hvx_truncation_is_a_data_size_error() {
    let mut q = queue(&[Reply::Written(6)]);
    q.register(CONN_1).unwrap();
    let data = [0xAB; 10];
    let res = q.submit(
        CONN_1,
        Request::gatts_hvx(hvx_params(), &data).on_error(record_error, 3),
    );
    assert_eq!(res, Ok(Submitted::Accepted));
    assert_eq!(errors(), [(CONN_1, NrfError::DataSize, 3)]);
}

#[test]
fn buffered_hvx_truncation_is_reported_and_freed() {
    let mut q = queue(&[Reply::Fail(NrfError::Busy), Reply::Written(2)]);
    q.register(CONN_1).unwrap();
    q.submit(
        CONN_1,
        Request::gatts_hvx(hvx_params(), b"abcdefgh").on_error(record_error, 4),
    )
    .unwrap();
    assert_eq!(q.stats().payload_allocations, 1);

    q.on_ble_evt(&gatts_evt(CONN_1));
    assert_eq!(errors(), [(CONN_1, NrfError::DataSize, 4)]);
    assert_eq!(q.stats().payload_allocations, 0);
    assert_eq!(q.stats().requests_in_use, 0);
}

#[test]
fn failure_without_handler_is_dropped_quietly() {
    let mut q = queue(&[Reply::Fail(NrfError::InvalidState)]);
    q.register(CONN_1).unwrap();
    assert_eq!(
        q.submit(CONN_1, Request::gattc_read(1, 0)),
        Ok(Submitted::Accepted)
    );
    assert!(errors().is_empty());
}

#[test]
fn empty_write_is_buffered_without_payload() {
    let mut q = queue(&[Reply::Fail(NrfError::Busy)]);
    q.register(CONN_1).unwrap();
    q.submit(CONN_1, Request::gattc_write(write_params(), &[]))
        .unwrap();
    assert_eq!(q.stats().requests_in_use, 1);
    assert_eq!(q.stats().payload_allocations, 0);
    q.on_ble_evt(&gatts_evt(CONN_1));
    assert_eq!(q.stats().requests_in_use, 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Allocation failures
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn out_of_descriptors_leaves_no_trace() {
    let mut q: GattQueue<ScriptedController, 1, 2, 64> =
        GattQueue::new(ScriptedController::default());
    q.controller_mut()
        .script
        .push_back(Reply::Fail(NrfError::Busy));
    q.register(CONN_1).unwrap();
    q.submit(CONN_1, Request::gattc_read(1, 0)).unwrap();
    q.submit(CONN_1, Request::gattc_read(2, 0)).unwrap();

    let res = q.submit(CONN_1, Request::gattc_write(write_params(), b"xyz"));
    assert_eq!(res, Err(Error::OutOfMemory));
    assert_eq!(q.pending_len(CONN_1), Some(2));
    assert_eq!(q.stats().requests_in_use, 2);
    assert_eq!(q.stats().payload_allocations, 0);
}

#[test]
fn out_of_arena_rolls_back_descriptor() {
    let mut q: GattQueue<ScriptedController, 1, 4, 8> =
        GattQueue::new(ScriptedController::default());
    q.controller_mut()
        .script
        .push_back(Reply::Fail(NrfError::Busy));
    q.register(CONN_1).unwrap();
    q.submit(CONN_1, Request::gattc_write(write_params(), b"abcdef"))
        .unwrap();

    let res = q.submit(CONN_1, Request::gatts_hvx(hvx_params(), b"ghij"));
    assert_eq!(res, Err(Error::OutOfMemory));
    assert_eq!(q.stats().requests_in_use, 1);
    assert_eq!(q.stats().payload_bytes_in_use, 6);
    assert_eq!(q.pending_len(CONN_1), Some(1));

    // Payload-free requests still fit.
    assert_eq!(
        q.submit(CONN_1, Request::gattc_read(1, 0)),
        Ok(Submitted::Buffered)
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// Events & purge
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn irrelevant_and_foreign_events_are_ignored() {
    let mut q = queue(&[Reply::Fail(NrfError::Busy)]);
    q.register(CONN_1).unwrap();
    q.submit(CONN_1, Request::gattc_read(1, 0)).unwrap();

    q.on_ble_evt(&BleEvent::new(BLE_GAP_EVT_CONNECTED, CONN_1));
    q.on_ble_evt(&gatts_evt(CONN_2));
    q.on_ble_evt(&BleEvent::disconnected(CONN_2));
    assert_eq!(q.controller().calls.len(), 1);
    assert_eq!(q.pending_len(CONN_1), Some(1));
    assert_eq!(q.stats().purges_pending, 0);
}

#[test]
fn disconnect_defers_release_to_next_registry_call() {
    let mut q = queue(&[Reply::Fail(NrfError::Busy)]);
    q.register(CONN_1).unwrap();
    q.register(CONN_2).unwrap();
    q.submit(CONN_1, Request::gattc_write(write_params(), b"one"))
        .unwrap();
    q.submit(CONN_1, Request::gatts_hvx(hvx_params(), b"two"))
        .unwrap();
    q.submit(CONN_1, Request::gattc_read(3, 0)).unwrap();

    q.on_ble_evt(&BleEvent::disconnected(CONN_1));
    assert_eq!(q.find(CONN_1), None);
    let stats = q.stats();
    assert_eq!(stats.requests_in_use, 3);
    assert_eq!(stats.payload_allocations, 2);
    assert_eq!(stats.purges_pending, 1);

    // A second disconnect for the same handle is ignored.
    q.on_ble_evt(&BleEvent::disconnected(CONN_1));
    assert_eq!(q.stats().purges_pending, 1);

    // Unrelated submit drains first.
    assert_eq!(
        q.submit(CONN_2, Request::gattc_read(1, 0)),
        Ok(Submitted::Accepted)
    );
    assert_eq!(
        q.stats(),
        GqStats {
            connections: 1,
            ..GqStats::default()
        }
    );
    // Nothing purged was ever dispatched again.
    assert_eq!(q.controller().calls.len(), 2);
}

#[test]
fn purged_slot_is_reusable() {
    let mut q: GattQueue<ScriptedController, 1, 4, 32> =
        GattQueue::new(ScriptedController::default());
    q.controller_mut()
        .script
        .push_back(Reply::Fail(NrfError::Busy));
    assert_eq!(q.register(CONN_1), Ok(0));
    q.submit(CONN_1, Request::gattc_read(1, 0)).unwrap();
    q.on_ble_evt(&BleEvent::disconnected(CONN_1));

    assert_eq!(q.register(CONN_2), Ok(0));
    assert_eq!(q.pending_len(CONN_2), Some(0));
    assert_eq!(q.find(CONN_1), None);
    assert_eq!(q.stats().requests_in_use, 0);

    // The new connection dispatches directly: its list is empty.
    assert_eq!(
        q.submit(CONN_2, Request::gattc_read(2, 0)),
        Ok(Submitted::Accepted)
    );
}

#[test]
fn retry_event_after_disconnect_does_nothing() {
    let mut q = queue(&[Reply::Fail(NrfError::Busy)]);
    q.register(CONN_1).unwrap();
    q.submit(CONN_1, Request::gattc_read(1, 0)).unwrap();
    q.on_ble_evt(&BleEvent::disconnected(CONN_1));
    q.on_ble_evt(&gatts_evt(CONN_1));
    q.try_process(0);
    assert_eq!(q.controller().calls.len(), 1);
}

#[test]
fn connections_are_isolated() {
    let mut q = queue(&[Reply::Fail(NrfError::Busy)]);
    q.register(CONN_1).unwrap();
    q.register(CONN_2).unwrap();
    q.submit(CONN_1, Request::gattc_read(1, 0)).unwrap();

    // CONN_2 has nothing pending, so it goes straight through.
    assert_eq!(
        q.submit(CONN_2, Request::gattc_read(2, 0)),
        Ok(Submitted::Accepted)
    );
    assert_eq!(q.pending_len(CONN_1), Some(1));
    assert_eq!(q.pending_len(CONN_2), Some(0));
}
