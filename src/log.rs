//! A thin logging shim over the `log` crate.
//!
//! Kept as a macro layer (rather than calling `::log::*!` directly at every
//! call site) so the rest of the crate doesn't care which logging backend is
//! wired up by the binary that embeds it.

#![macro_use]
#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        ::log::trace!($s $(, $x)*);
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        ::log::debug!($s $(, $x)*);
    };
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        ::log::info!($s $(, $x)*);
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        ::log::warn!($s $(, $x)*);
    };
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        ::log::error!($s $(, $x)*);
    };
}
