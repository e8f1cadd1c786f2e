//! The external transport collaborator (spec §6): a line-discipline-style
//! byte sink this crate writes framed, obfuscated bytes into. Everything
//! about the concrete serial transport lives outside this crate.

use core::fmt;

/// A transport write failed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TransportError {
    /// The transport accepted fewer bytes than were handed to it.
    ShortWrite {
        /// Bytes that should have been written.
        expected: usize,
        /// Bytes actually written.
        written: usize,
    },
    /// The transport rejected the write outright.
    Rejected,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ShortWrite { expected, written } => write!(
                f,
                "transport wrote {written} of {expected} bytes"
            ),
            TransportError::Rejected => f.write_str("transport rejected the write"),
        }
    }
}

impl std::error::Error for TransportError {}

/// The write half of a bus's transport.
///
/// The inbound half is not a trait method here: the transport owner pushes
/// bytes in by calling [`crate::bus::Bus::receive`] directly, and signals a
/// completed write via [`crate::bus::Bus::write_complete`] (spec §6).
pub trait Transport: Send + Sync {
    /// Write `bytes` to the underlying byte stream, returning the number of
    /// bytes actually written.
    fn write(&self, bytes: &[u8]) -> Result<usize, TransportError>;
}
