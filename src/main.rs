//! Example firmware: a peripheral that streams notifications through the
//! GATT queue.
//!
//! Each connected central that enables notifications gets a counter value
//! every `DEMO_NOTIFY_INTERVAL_MS`. Notifications the SoftDevice cannot take
//! right away are buffered by the queue and replayed in order.

#![no_std]
#![no_main]

use core::cell::{Cell, RefCell};

use ble_gq::config::{DEMO_NOTIFY_INTERVAL_MS, DEMO_NOTIFY_LEN, GQ_MAX_CONNECTIONS};
use ble_gq::gatt_queue::event::{BLE_GATTS_EVT_HVN_TX_COMPLETE, BLE_GATTS_EVT_WRITE};
use ble_gq::gatt_queue::{HvxParams, HvxType};
use ble_gq::softdevice::SoftDeviceController;
use ble_gq::{BleEvent, DefaultGattQueue, Error, NrfError, Request, Submitted};
use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::interrupt;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Timer;
use nrf_softdevice::ble::advertisement_builder::{
    Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload,
};
use nrf_softdevice::ble::{gatt_server, peripheral, Connection};
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

type Queue = DefaultGattQueue<SoftDeviceController>;

/// The one queue instance. Every entry point runs inside the critical
/// section, so event feeding and submission never interleave.
static QUEUE: Mutex<CriticalSectionRawMutex, RefCell<Option<Queue>>> =
    Mutex::new(RefCell::new(None));

static SERVER: StaticCell<Server> = StaticCell::new();

fn with_queue<R>(f: impl FnOnce(&mut Queue) -> R) -> Option<R> {
    QUEUE.lock(|q| q.borrow_mut().as_mut().map(f))
}

#[nrf_softdevice::gatt_service(uuid = "9e7312e0-2354-11eb-9f10-fbc30a62cf38")]
pub struct StreamService {
    #[characteristic(uuid = "9e7312e0-2354-11eb-9f10-fbc30a63cf38", read, notify)]
    counter: heapless::Vec<u8, DEMO_NOTIFY_LEN>,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    stream: StreamService,
}

static ADV_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
    .full_name("ble-gq")
    .build();

static SCAN_DATA: [u8; 0] = [];

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Booted");
    let mut c = embassy_nrf::config::Config::default();
    c.gpiote_interrupt_priority = interrupt::Priority::P2;
    c.time_interrupt_priority = interrupt::Priority::P2;
    let _p = embassy_nrf::init(c);

    let config = nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: GQ_MAX_CONNECTIONS as u8,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 256 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: GQ_MAX_CONNECTIONS as u8,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: b"ble-gq" as *const u8 as _,
            current_len: 6,
            max_len: 6,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    };

    let sd = Softdevice::enable(&config);
    let server = SERVER.init(unwrap!(Server::new(sd)));
    QUEUE.lock(|q| *q.borrow_mut() = Some(Queue::new(SoftDeviceController::new(sd))));
    spawner.must_spawn(softdevice_task(sd));

    loop {
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &ADV_DATA,
            scan_data: &SCAN_DATA,
        };
        let conn = match peripheral::advertise_connectable(sd, adv, &Default::default()).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Advertising failed: {:?}", e);
                Timer::after_millis(500).await;
                continue;
            }
        };
        if spawner.spawn(connection_task(conn, server)).is_err() {
            warn!("No free connection task, dropping link");
        }
    }
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task(pool_size = GQ_MAX_CONNECTIONS)]
async fn connection_task(conn: Connection, server: &'static Server) {
    let Some(conn_handle) = conn.handle() else {
        return;
    };
    match with_queue(|q| q.register(conn_handle)) {
        Some(Ok(slot)) => info!("Connection {} uses queue slot {}", conn_handle, slot),
        Some(Err(e)) => {
            warn!("Connection {} not queued: {}", conn_handle, e);
            return;
        }
        None => return,
    }

    let notify = Cell::new(false);
    let events = gatt_server::run(&conn, server, |e| {
        match e {
            ServerEvent::Stream(StreamServiceEvent::CounterCccdWrite { notifications }) => {
                info!("Connection {} notifications: {}", conn_handle, notifications);
                notify.set(notifications);
            }
        }
        with_queue(|q| q.on_ble_evt(&BleEvent::new(BLE_GATTS_EVT_WRITE, conn_handle)));
    });
    let stream = stream_counter(conn_handle, server.stream.counter_value_handle, &notify);

    match select(events, stream).await {
        Either::First(e) => info!("Connection {} closed: {:?}", conn_handle, e),
        Either::Second(()) => {}
    }
    with_queue(|q| q.on_ble_evt(&BleEvent::disconnected(conn_handle)));
}

/// Submit a counter notification every interval while notifications are on.
///
/// The SoftDevice driver consumes raw BLE events itself, so TX-complete is
/// not observable here; each tick reports it before submitting.
async fn stream_counter(conn_handle: u16, value_handle: u16, notify: &Cell<bool>) {
    let params = HvxParams {
        handle: value_handle,
        hvx_type: HvxType::Notification,
        offset: 0,
    };
    let mut counter: u32 = 0;
    let mut data = [0u8; DEMO_NOTIFY_LEN];
    loop {
        Timer::after_millis(DEMO_NOTIFY_INTERVAL_MS).await;
        with_queue(|q| q.on_ble_evt(&BleEvent::new(BLE_GATTS_EVT_HVN_TX_COMPLETE, conn_handle)));
        if !notify.get() {
            continue;
        }

        data[..4].copy_from_slice(&counter.to_le_bytes());
        let req = Request::gatts_hvx(params, &data).on_error(on_notify_error, counter as usize);
        match with_queue(|q| q.submit(conn_handle, req)) {
            Some(Ok(Submitted::Accepted)) => {}
            Some(Ok(Submitted::Buffered)) => {
                info!("Notification {} buffered on {}", counter, conn_handle)
            }
            Some(Err(Error::OutOfMemory)) => {
                warn!("Queue full, notification {} dropped", counter)
            }
            Some(Err(e)) => {
                warn!("Submit on {} failed: {}", conn_handle, e);
                return;
            }
            None => return,
        }
        counter = counter.wrapping_add(1);
    }
}

fn on_notify_error(conn_handle: u16, err: NrfError, ctx: usize) {
    warn!(
        "Notification {} on connection {} failed: {}",
        ctx, conn_handle, err
    );
}
