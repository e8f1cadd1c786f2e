//! The public control API: `send_request`, `ping`, `send_response` (spec
//! §4.5). Free functions over a `&Bus` rather than methods, mirroring how
//! `ethercrab`'s `Command`/`PduLoop` keep the wire-level request/response
//! flow separate from the types it operates on.

use std::time::Duration;

use crate::bus::Bus;
use crate::device::Device;
use crate::error::Error;
use crate::frame::{Frame, FrameKind, ERROR_SENTINEL};
use crate::wait::ExpectedKind;

/// Send a ping on `bus` and block for its pong.
pub fn ping(bus: &Bus, timeout: Duration) -> Result<(), Error> {
    let request = Frame::keepalive(FrameKind::Ping);
    bus.send_frame(&request)?;
    match bus.wait_for(&request, ExpectedKind::Pong, timeout) {
        Some(_) => Ok(()),
        None => Err(Error::Timeout),
    }
}

/// Send a control request to `device` on its bus and block for the
/// matching response, copying its detail bytes into `out`.
///
/// Returns the number of bytes written into `out`. Fails with
/// [`Error::NoSpace`] if `out` is shorter than the response detail, without
/// making any partial write visible to the caller (spec §7).
pub fn send_request(
    bus: &Bus,
    device: &Device,
    control_code: u8,
    payload: &[u8],
    timeout: Duration,
    out: &mut [u8],
) -> Result<usize, Error> {
    let detail = send_request_vec(bus, device, control_code, payload, timeout)?;
    if detail.len() > out.len() {
        return Err(Error::NoSpace {
            needed: detail.len(),
            available: out.len(),
        });
    }
    out[..detail.len()].copy_from_slice(&detail);
    Ok(detail.len())
}

/// As [`send_request`], but returns a freshly allocated `Vec<u8>` instead of
/// requiring a caller-sized buffer (spec §4.5's ergonomic `std` addition;
/// the underlying protocol path is identical).
pub fn send_request_vec(
    bus: &Bus,
    device: &Device,
    control_code: u8,
    payload: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, Error> {
    let request = Frame::control(FrameKind::Request, device.device_id(), control_code, payload)
        .ok_or(Error::PayloadTooLong {
            len: payload.len(),
            max: crate::frame::MAX_PAYLOAD - 2,
        })?;
    bus.send_frame(&request)?;

    let response = bus
        .wait_for(&request, ExpectedKind::Response, timeout)
        .ok_or(Error::Timeout)?;

    if response.is_error_response() {
        return Err(Error::PeerError(response.control_code()));
    }
    Ok(response.detail().to_vec())
}

/// Send a control response for a previously received request (spec §4.5,
/// driver-initiated `report` replies). Drivers call this from their
/// `report` callback; it must never block on [`send_request`]/[`ping`]
/// waiting for a further reply, or it would deadlock the single worker
/// (spec §4.5).
pub fn send_response(
    bus: &Bus,
    device: &Device,
    control_code: u8,
    detail: &[u8],
) -> Result<(), Error> {
    let response = Frame::control(FrameKind::Response, device.device_id(), control_code, detail)
        .ok_or(Error::PayloadTooLong {
            len: detail.len(),
            max: crate::frame::MAX_PAYLOAD - 2,
        })?;
    bus.send_frame(&response)?;
    Ok(())
}

/// Send an error response with the reserved sentinel device id (spec §3,
/// §7 `PeerError`).
pub fn send_error_response(bus: &Bus, error_code: u8) -> Result<(), Error> {
    let response = Frame::control(FrameKind::Response, ERROR_SENTINEL, error_code, &[])
        .expect("empty detail always fits");
    bus.send_frame(&response)?;
    Ok(())
}
