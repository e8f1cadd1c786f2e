//! Error types for the bus core.
//!
//! Framing errors never reach this boundary (spec §7) — they're logged and
//! the offending byte is skipped by the receiver. Everything the public
//! Control API can return is a variant of [`Error`].

use core::fmt;

use crate::transport::TransportError;

/// An error returned by the bus core's public API.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Error {
    /// No response arrived before the caller's deadline.
    Timeout,
    /// The transport failed to accept a write.
    TransportFailed(TransportError),
    /// The peer replied with an error response. Carries the byte at the
    /// control-code position of that response.
    PeerError(u8),
    /// The caller's output buffer is smaller than the response detail.
    NoSpace {
        /// Bytes required to hold the full response detail.
        needed: usize,
        /// Bytes actually available in the caller's buffer.
        available: usize,
    },
    /// A device with this id already exists on the bus.
    DuplicateDevice(u8),
    /// A driver claiming one of these names is already registered.
    DuplicateDriver,
    /// The registry has no free bus ids left.
    BusExhausted,
    /// No bus with this id is registered.
    UnknownBus,
    /// No device with this id is bound on the bus.
    UnknownDevice,
    /// A control payload is too long to fit in a single frame.
    PayloadTooLong {
        /// Bytes the caller tried to send.
        len: usize,
        /// Maximum a control payload may carry.
        max: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => f.write_str("timed out waiting for a response"),
            Error::TransportFailed(e) => write!(f, "transport failed: {e}"),
            Error::PeerError(code) => write!(f, "peer returned error code {code}"),
            Error::NoSpace { needed, available } => write!(
                f,
                "response needs {needed} bytes but only {available} were available"
            ),
            Error::DuplicateDevice(id) => write!(f, "device id {id} already registered on bus"),
            Error::DuplicateDriver => f.write_str("a driver already claims one of these names"),
            Error::BusExhausted => f.write_str("no free bus ids remain"),
            Error::UnknownBus => f.write_str("unknown bus id"),
            Error::UnknownDevice => f.write_str("unknown device id"),
            Error::PayloadTooLong { len, max } => {
                write!(f, "payload of {len} bytes exceeds the {max}-byte maximum")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::TransportFailed(e)
    }
}

/// Internal-only framing error. Never crosses the public API; the receiver
/// logs these and skips one byte before retrying (spec §4.1, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameError {
    /// Candidate frame's `length` byte exceeds [`crate::frame::MAX_PAYLOAD`].
    LengthOverflow,
    /// Header checksum didn't match.
    BadHeaderChecksum,
    /// Message checksum didn't match.
    BadMessageChecksum,
    /// The identity byte isn't one of the four known frame kinds.
    UnknownKind(u8),
    /// A request/response candidate's payload is shorter than the two-byte
    /// `device_id | control_code` prefix it must carry.
    ShortControlPayload,
    /// No magic pair was found in the scanned window.
    NoMagic,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::LengthOverflow => f.write_str("payload length exceeds maximum"),
            FrameError::BadHeaderChecksum => f.write_str("header checksum mismatch"),
            FrameError::BadMessageChecksum => f.write_str("message checksum mismatch"),
            FrameError::UnknownKind(b) => write!(f, "unknown frame identity byte {b:#04x}"),
            FrameError::ShortControlPayload => {
                f.write_str("request/response payload shorter than the control prefix")
            }
            FrameError::NoMagic => f.write_str("no magic pair found"),
        }
    }
}
