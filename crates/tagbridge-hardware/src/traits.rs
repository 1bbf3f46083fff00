//! Hardware device trait definitions.
//!
//! These traits are the boundary between the adapters and the drivers. The
//! card side is push-based (the service reports readers and cards as they
//! come and go); the serial side is pull-based (the scanner adapter decides
//! when to enumerate, open and read).
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro. Because such traits are
//! not object-safe, backends are dispatched through the enums in
//! [`crate::devices`].

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::types::PortDescriptor;
use bytes::Bytes;

/// Notification from a contactless card service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardServiceEvent {
    /// A reader became available.
    ReaderAttached { reader: String },

    /// A reader went away.
    ReaderDetached { reader: String },

    /// A card entered the field of `reader`.
    CardPresented { reader: String, uid: Vec<u8> },

    /// A single reader reported a problem. Other readers are unaffected.
    ReaderError { reader: String, message: String },

    /// The service itself reported a problem.
    ServiceError { message: String },
}

/// Source of card reader notifications (e.g., a PC/SC resource manager).
///
/// # Examples
///
/// ```no_run
/// use tagbridge_hardware::traits::{CardService, CardServiceEvent};
///
/// async fn print_cards<S: CardService>(service: &mut S) {
///     while let Some(event) = service.next_event().await {
///         if let CardServiceEvent::CardPresented { reader, uid } = event {
///             println!("{reader}: {uid:02X?}");
///         }
///     }
/// }
/// ```
pub trait CardService: Send {
    /// Wait for the next notification.
    ///
    /// Returns `None` once the service has shut down for good.
    async fn next_event(&mut self) -> Option<CardServiceEvent>;
}

/// Access to the serial ports of the host.
pub trait SerialBackend: Send + Sync {
    /// Open port type produced by this backend.
    type Port: SerialPort;

    /// List the ports currently present, in enumeration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS enumeration fails.
    fn available_ports(&self) -> Result<Vec<PortDescriptor>>;

    /// Open `name` at `baud_rate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port does not exist or cannot be opened.
    async fn open(&self, name: &str, baud_rate: u32) -> Result<Self::Port>;
}

/// An open serial port.
pub trait SerialPort: Send {
    /// Wait for the next chunk of bytes.
    ///
    /// Chunks carry no framing: a line may span several chunks and a chunk
    /// may hold several lines. Returns `Ok(None)` when the port closed.
    ///
    /// # Errors
    ///
    /// Returns an error if reading failed (e.g., the device was unplugged).
    async fn read_chunk(&mut self) -> Result<Option<Bytes>>;
}
