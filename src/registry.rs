//! The explicit, owned context: a set of buses and a set of drivers, plus
//! the single worker that drains the global event queue (spec §4.4, §9
//! "Process-wide state" — a value with init/teardown lifetime, not an
//! ambient singleton).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::bus::{Bus, BusId, LateInitHook};
use crate::config::Config;
use crate::device::Device;
use crate::driver::Driver;
use crate::error::Error;
use crate::event::{Event, EventQueue, TypedEvent};
use crate::frame::{Frame, FrameKind};
use crate::transport::Transport;

struct BusTable {
    buses: HashMap<BusId, Arc<Bus>>,
    free_ids: Vec<BusId>,
    next_id: BusId,
}

impl BusTable {
    fn new() -> Self {
        Self {
            buses: HashMap::new(),
            free_ids: Vec::new(),
            next_id: 0,
        }
    }

    /// Dense id allocation, reusing freed ids (spec §4.4 "monotonic reuse of
    /// freed ids permitted", matching `idr_alloc`'s dense-reuse behavior).
    fn allocate(&mut self) -> Result<BusId, Error> {
        if let Some(id) = self.free_ids.pop() {
            return Ok(id);
        }
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).ok_or(Error::BusExhausted)?;
        Ok(id)
    }

    fn release(&mut self, id: BusId) {
        self.free_ids.push(id);
    }
}

struct RegistryInner {
    buses: Mutex<BusTable>,
    drivers: Mutex<Vec<Option<Arc<dyn Driver>>>>,
    events: EventQueue,
    config: Config,
}

/// Owns a set of buses, a set of drivers, and the single worker thread that
/// drains decoded frames and dispatches them (spec §2 "Bus registry", §9
/// "Process-wide state").
pub struct Registry {
    inner: Arc<RegistryInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Registry {
    /// Build a registry and start its worker thread.
    pub fn new(config: Config) -> Arc<Self> {
        let events = EventQueue::new();
        let inner = Arc::new(RegistryInner {
            buses: Mutex::new(BusTable::new()),
            drivers: Mutex::new(Vec::new()),
            events,
            config,
        });

        let worker_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("mcubus-worker".into())
            .spawn(move || worker_loop(worker_inner))
            .expect("failed to spawn mcubus worker thread");

        Arc::new(Self {
            inner,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Register a new bus. `late_init`, if given, runs exactly once shortly
    /// after registration (spec §4.3 `LateInit`).
    pub fn register_bus(
        &self,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        late_init: Option<LateInitHook>,
    ) -> Result<BusId, Error> {
        let mut table = self.inner.buses.lock().unwrap();
        let id = table.allocate()?;
        let bus = Arc::new(Bus::new(
            id,
            name,
            transport,
            late_init,
            self.inner.events.clone(),
            self.inner.config.reap_after,
            self.inner.config.reap_sweep_threshold,
        ));
        table.buses.insert(id, bus);
        drop(table);
        self.inner.events.enqueue(Event::LateInit(id));
        Ok(id)
    }

    /// Tear down a bus: remove every child device (running each bound
    /// driver's `remove`), then drop the bus's own state (spec §4.4
    /// "Unregistration").
    pub fn unregister_bus(&self, id: BusId) -> Result<(), Error> {
        let bus = {
            let mut table = self.inner.buses.lock().unwrap();
            let bus = table.buses.remove(&id).ok_or(Error::UnknownBus)?;
            table.release(id);
            bus
        };

        let drivers = self.inner.drivers.lock().unwrap();
        for device in bus.devices_snapshot() {
            if let Some(index) = device.driver_index {
                if let Some(Some(driver)) = drivers.get(index) {
                    driver.remove(&device);
                }
            }
        }
        Ok(())
    }

    /// Look up a registered bus by id.
    pub fn bus(&self, id: BusId) -> Result<Arc<Bus>, Error> {
        self.inner
            .buses
            .lock()
            .unwrap()
            .buses
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownBus)
    }

    /// Register a driver. Fails if any name it claims is already claimed by
    /// a registered driver (spec §4.4 binding is first-match-wins across
    /// distinct drivers, so overlapping name tables are rejected up front).
    /// Scans every existing device on every bus and binds + probes the ones
    /// this driver's name table matches (spec §4.4 "A driver registered
    /// after devices scans existing devices and attempts to bind").
    pub fn register_driver(&self, driver: Arc<dyn Driver>) -> Result<(), Error> {
        let mut drivers = self.inner.drivers.lock().unwrap();
        for existing in drivers.iter().filter_map(|d| d.as_ref()) {
            if driver.names().iter().any(|n| existing.matches(n)) {
                return Err(Error::DuplicateDriver);
            }
        }

        let index = match drivers.iter().position(|d| d.is_none()) {
            Some(i) => {
                drivers[i] = Some(Arc::clone(&driver));
                i
            }
            None => {
                drivers.push(Some(Arc::clone(&driver)));
                drivers.len() - 1
            }
        };
        drop(drivers);

        let table = self.inner.buses.lock().unwrap();
        let buses: Vec<Arc<Bus>> = table.buses.values().cloned().collect();
        drop(table);

        for bus in buses {
            let newly_bound = bus.bind_unbound(index, |name| driver.matches(name));
            for device in newly_bound {
                driver.probe(&device);
            }
        }
        Ok(())
    }

    /// Unregister a driver, running its `remove` on every device it had
    /// bound and clearing those bindings, without removing the devices
    /// themselves (spec §4.4 "Unregistration").
    pub fn unregister_driver(&self, driver: &Arc<dyn Driver>) -> Result<(), Error> {
        let index = {
            let mut drivers = self.inner.drivers.lock().unwrap();
            let index = drivers
                .iter()
                .position(|d| matches!(d, Some(existing) if Arc::ptr_eq(existing, driver)))
                .ok_or(Error::UnknownDevice)?;
            drivers[index] = None;
            index
        };

        let table = self.inner.buses.lock().unwrap();
        let buses: Vec<Arc<Bus>> = table.buses.values().cloned().collect();
        drop(table);

        for bus in buses {
            for device in bus.devices_snapshot() {
                if device.driver_index == Some(index) {
                    driver.remove(&device);
                }
            }
            bus.unbind_driver(index);
        }
        Ok(())
    }

    /// Add a device to `bus_id`, binding it to the first driver whose name
    /// table matches (spec §4.4 "Registering a device").
    pub fn new_device(
        &self,
        bus_id: BusId,
        device_id: u8,
        name: impl Into<String>,
    ) -> Result<(), Error> {
        let bus = self.bus(bus_id)?;
        let name = name.into();
        let mut device = Device::new(device_id, name.clone());

        let drivers = self.inner.drivers.lock().unwrap();
        let bound = drivers
            .iter()
            .enumerate()
            .find_map(|(index, d)| d.as_ref().filter(|d| d.matches(&name)).map(|d| (index, d.clone())));
        drop(drivers);

        if let Some((index, _)) = &bound {
            device.driver_index = Some(*index);
        }
        bus.add_device(device.clone())?;

        if let Some((_, driver)) = bound {
            driver.probe(&device);
        }
        Ok(())
    }

    /// Remove a device from `bus_id`, running its bound driver's `remove`
    /// first, if any.
    pub fn remove_device(&self, bus_id: BusId, device_id: u8) -> Result<(), Error> {
        let bus = self.bus(bus_id)?;
        let device = bus.take_device(device_id).ok_or(Error::UnknownDevice)?;
        if let Some(index) = device.driver_index {
            let drivers = self.inner.drivers.lock().unwrap();
            if let Some(Some(driver)) = drivers.get(index) {
                driver.remove(&device);
            }
        }
        Ok(())
    }

    pub(crate) fn events(&self) -> &EventQueue {
        &self.inner.events
    }

    /// Stop the worker thread and wait for it to exit.
    pub fn shutdown(&self) {
        self.inner.events.shutdown();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The single worker's drain loop (spec §4.3 dispatch table).
fn worker_loop(inner: Arc<RegistryInner>) {
    while let Some(event) = inner.events.pop_blocking() {
        match event {
            Event::DataReceived(bus_id) => {
                if let Some(bus) = lookup(&inner, bus_id) {
                    bus.drain_decoded();
                }
            }
            Event::WriteComplete(_) => {}
            Event::LateInit(bus_id) => {
                if let Some(bus) = lookup(&inner, bus_id) {
                    bus.run_late_init();
                }
            }
            Event::Typed(bus_id, typed) => {
                if let Some(bus) = lookup(&inner, bus_id) {
                    dispatch_typed(&inner, &bus, typed);
                }
            }
        }
    }
}

fn lookup(inner: &RegistryInner, bus_id: BusId) -> Option<Arc<Bus>> {
    inner.buses.lock().unwrap().buses.get(&bus_id).cloned()
}

fn dispatch_typed(inner: &RegistryInner, bus: &Arc<Bus>, typed: TypedEvent) {
    match typed {
        TypedEvent::Ping(_frame) => {
            let pong = Frame::keepalive(FrameKind::Pong);
            if let Err(e) = bus.send_frame(&pong) {
                warn!("mcubus: failed to send pong on bus {}: {}", bus.id(), e);
            }
        }
        TypedEvent::Pong(frame) => bus.post_delivered(frame),
        TypedEvent::Response(frame) => bus.post_delivered(frame),
        TypedEvent::Request(frame) => {
            let device_id = frame.device_id();
            let control_code = frame.control_code();
            let detail = frame.detail().to_vec();
            let Some((device, driver_index)) =
                bus.with_device(device_id, |d| (d.clone(), d.driver_index))
            else {
                warn!(
                    "mcubus: request for unbound device {} on bus {}",
                    device_id,
                    bus.id()
                );
                return;
            };
            let Some(index) = driver_index else {
                warn!(
                    "mcubus: request for device {} on bus {} has no bound driver",
                    device_id,
                    bus.id()
                );
                return;
            };
            let drivers = inner.drivers.lock().unwrap();
            if let Some(Some(driver)) = drivers.get(index) {
                let driver = Arc::clone(driver);
                drop(drivers);
                driver.report(&device, control_code, &detail);
            }
        }
    }
}
