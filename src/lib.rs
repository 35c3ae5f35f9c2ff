//! Attribute-serving core of a BLE GATT server.
//!
//! Firmware declares services and characteristics against an
//! [`AttributeTable`](table::AttributeTable); the table assigns dense 16-bit
//! handles starting at 1 and serves every attribute through the uniform
//! access contract in [`access`]. The transport (L2CAP/HCI), security manager
//! and advertising are external collaborators: they hand this crate a handle
//! plus [`AccessArgs`](access::AccessArgs) and get back an
//! [`AccessResult`](access::AccessResult).
//!
//! No allocation happens at any point: attribute storage is borrowed from the
//! application, and the table itself is a fixed-capacity vector built once at
//! startup.
#![no_std]

mod fmt;

mod cursor;
pub(crate) mod types;

pub mod access;
pub mod attribute;
pub mod cccd;
pub mod table;

pub use types::uuid::Uuid;

/// Errors returned by application-facing table operations.
///
/// Protocol-visible failures never surface here; they are reported through
/// [`access::AccessResult`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Destination buffer too small for the encoded output.
    InsufficientSpace,
    /// No attribute with the requested handle.
    NotFound,
    /// Uuid byte slice of unsupported length.
    InvalidUuidLength(usize),
    /// Value length does not match the bound storage.
    UnexpectedDataLength {
        /// Length of the bound storage.
        expected: usize,
        /// Length of the provided value.
        actual: usize,
    },
}
