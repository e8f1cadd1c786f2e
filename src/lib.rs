//! `mcubus` — the core of a coprocessor bus: a framed, checksummed,
//! XOR-obfuscated binary protocol that multiplexes request/response control
//! exchanges and keep-alive ping/pong between a host and one or more peer
//! microcontrollers over a byte-oriented serial transport.
//!
//! This crate owns the packet codec and receive reassembly buffer, the
//! event queue and per-bus wait/notify correlation, and the bus/device/
//! driver registry. The concrete serial transport, device-class adapters,
//! and OS integration are all consumed through the [`Transport`] and
//! [`Driver`] traits and live outside this crate.

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod log;

mod bus;
mod codec;
mod config;
mod control;
mod device;
mod driver;
pub mod error;
mod event;
mod frame;
mod receiver;
mod registry;
mod transport;
mod wait;

pub use bus::{Bus, BusId, LateInitHook};
pub use config::Config;
pub use control::{ping, send_error_response, send_request, send_request_vec, send_response};
pub use device::{Device, NAME_SIZE};
pub use driver::Driver;
pub use error::Error;
pub use frame::{ERROR_SENTINEL, Frame, FrameKind, MAX_PAYLOAD};
pub use registry::Registry;
pub use transport::{Transport, TransportError};
