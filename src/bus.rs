//! A bus: one transport endpoint, its receive ring, its delivered-response
//! queue, and its child devices (spec §3 "Bus").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::codec::encode_frame;
use crate::device::Device;
use crate::error::Error;
use crate::event::{Event, EventQueue, TypedEvent};
use crate::frame::{Frame, FrameKind};
use crate::receiver::Receiver;
use crate::transport::{Transport, TransportError};
use crate::wait::{BusWait, ExpectedKind};

/// Dense, registry-assigned bus identifier (spec §4.4).
pub type BusId = u32;

/// A late-init hook, run exactly once after a bus is registered (spec §4.3
/// `LateInit`).
pub type LateInitHook = Box<dyn Fn() + Send + Sync>;

/// One transport endpoint: ring, delivered queue, child devices, and the
/// transport write handle (spec §3 "Bus", `mcu-bus.h`'s `struct
/// mcu_bus_device`).
pub struct Bus {
    id: BusId,
    name: String,
    transport: Arc<dyn Transport>,
    receiver: Mutex<Receiver>,
    wait: BusWait,
    devices: Mutex<Vec<Device>>,
    late_init: Option<LateInitHook>,
    late_init_done: AtomicBool,
    events: EventQueue,
    reap_after: Duration,
    reap_sweep_threshold: usize,
}

impl Bus {
    pub(crate) fn new(
        id: BusId,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        late_init: Option<LateInitHook>,
        events: EventQueue,
        reap_after: Duration,
        reap_sweep_threshold: usize,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            transport,
            receiver: Mutex::new(Receiver::new()),
            wait: BusWait::new(),
            devices: Mutex::new(Vec::new()),
            late_init,
            late_init_done: AtomicBool::new(false),
            events,
            reap_after,
            reap_sweep_threshold,
        }
    }

    /// This bus's registry-assigned id.
    pub fn id(&self) -> BusId {
        self.id
    }

    /// The human-readable name this bus was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Called by the transport owner when bytes arrive, from any context
    /// (spec §5 "may enqueue from any context including interrupt-like
    /// contexts"). Appends to the ring under a short lock and schedules a
    /// `DataReceived` event; never blocks on the worker.
    pub fn receive(&self, bytes: &[u8]) {
        let mut appended = 0;
        while appended < bytes.len() {
            let n = {
                let mut rx = self.receiver.lock().unwrap();
                rx.append(&bytes[appended..])
            };
            if n == 0 {
                break;
            }
            appended += n;
        }
        self.events.enqueue(Event::DataReceived(self.id));
    }

    /// Called by the transport owner when a previously started write
    /// finishes (spec §4.3 `WriteComplete`, currently a drained no-op).
    pub fn write_complete(&self) {
        self.events.enqueue(Event::WriteComplete(self.id));
    }

    /// Run this bus's late-init hook if present and not already run (spec
    /// §4.3 `LateInit`).
    pub(crate) fn run_late_init(&self) {
        if self.late_init_done.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hook) = &self.late_init {
            hook();
        }
    }

    /// Drain every frame currently decodable from the ring and translate
    /// each into a typed protocol event on the global queue (spec §4.3
    /// `DataReceived` handling).
    pub(crate) fn drain_decoded(&self) {
        let mut decoded = Vec::new();
        {
            let mut rx = self.receiver.lock().unwrap();
            rx.drain(|frame| decoded.push(frame));
        }
        for frame in decoded {
            let typed = match frame.kind {
                FrameKind::Ping => TypedEvent::Ping(frame),
                FrameKind::Pong => TypedEvent::Pong(frame),
                FrameKind::Request => TypedEvent::Request(frame),
                FrameKind::Response => TypedEvent::Response(frame),
            };
            self.events.enqueue(Event::Typed(self.id, typed));
        }
    }

    /// Encode and write `frame` to the transport.
    pub(crate) fn send_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        let wire = encode_frame(frame);
        let expected = wire.len();
        let written = self.transport.write(&wire)?;
        if written != expected {
            return Err(TransportError::ShortWrite { expected, written });
        }
        Ok(())
    }

    /// Post a decoded pong/response for waiters (spec §4.3 `PongDetected`/
    /// `ResponseDetected` handling).
    pub(crate) fn post_delivered(&self, frame: Frame) {
        self.wait
            .post_delivered(frame, self.reap_after, self.reap_sweep_threshold);
    }

    /// Block for a matching delivered response (spec §4.3 "Correlation").
    pub(crate) fn wait_for(
        &self,
        request: &Frame,
        expected: ExpectedKind,
        timeout: Duration,
    ) -> Option<Frame> {
        self.wait.wait_for(request, expected, timeout, self.reap_after)
    }

    /// Add a device to this bus's child list. Fails if `device_id` is
    /// already taken (spec §3 invariant "each bus's device_id set is
    /// unique").
    pub(crate) fn add_device(&self, device: Device) -> Result<(), Error> {
        let mut devices = self.devices.lock().unwrap();
        if devices.iter().any(|d| d.device_id() == device.device_id()) {
            return Err(Error::DuplicateDevice(device.device_id()));
        }
        devices.push(device);
        Ok(())
    }

    /// Remove and return the device with `device_id`, if bound on this bus.
    pub(crate) fn take_device(&self, device_id: u8) -> Option<Device> {
        let mut devices = self.devices.lock().unwrap();
        let pos = devices.iter().position(|d| d.device_id() == device_id)?;
        Some(devices.remove(pos))
    }

    /// Run `f` with a clone of the device bound to `device_id`, if any.
    pub(crate) fn with_device<R>(&self, device_id: u8, f: impl FnOnce(&Device) -> R) -> Option<R> {
        let devices = self.devices.lock().unwrap();
        devices.iter().find(|d| d.device_id() == device_id).map(f)
    }

    /// A clone of the device bound to `device_id`, if any (for callers
    /// building a [`crate::control::send_request`] call).
    pub fn device(&self, device_id: u8) -> Option<Device> {
        self.with_device(device_id, |d| d.clone())
    }

    /// Attempt to bind every currently unbound device against `matches`,
    /// recording `driver_index` on the first match (spec §4.4 "a driver
    /// registered after devices scans existing devices").
    pub(crate) fn bind_unbound(
        &self,
        driver_index: usize,
        matches: impl Fn(&str) -> bool,
    ) -> Vec<Device> {
        let mut devices = self.devices.lock().unwrap();
        let mut newly_bound = Vec::new();
        for device in devices.iter_mut() {
            if device.driver_index.is_none() && matches(&device.name) {
                device.driver_index = Some(driver_index);
                newly_bound.push(device.clone());
            }
        }
        newly_bound
    }

    /// Every device currently bound to `driver_index`, used when a driver
    /// unregisters (spec §4.4 "remove all device bindings without tearing
    /// down the devices themselves").
    pub(crate) fn unbind_driver(&self, driver_index: usize) {
        let mut devices = self.devices.lock().unwrap();
        for device in devices.iter_mut() {
            if device.driver_index == Some(driver_index) {
                device.driver_index = None;
            }
        }
    }

    /// A snapshot of every device currently on this bus.
    pub(crate) fn devices_snapshot(&self) -> Vec<Device> {
        self.devices.lock().unwrap().clone()
    }
}
