//! Device adapters for the tagbridge system.
//!
//! Two device families produce identifiers:
//!
//! - contactless card readers, reached through a [`CardService`] such as the
//!   PC/SC resource manager, handled by [`card::CardAdapter`];
//! - serial barcode scanners, reached through a [`SerialBackend`], handled
//!   by [`scanner::ScannerAdapter`], which also owns discovery and reconnect.
//!
//! Both adapters emit [`tagbridge_core::ObservedEvent`]s into a channel.
//! [`manager::AdapterManager`] runs them side by side.
//!
//! # Backends
//!
//! Mock backends in [`mock`] are always available. Real drivers are behind
//! features:
//!
//! - `hardware-pcsc`: [`pcsc_service::PcscCardService`] (needs a PC/SC
//!   daemon and its development headers)
//! - `hardware-serial`: [`system_serial::SystemSerial`]
//!
//! # Example
//!
//! ```no_run
//! use tagbridge_hardware::traits::SerialBackend;
//! use tagbridge_hardware::scanner::select_port;
//! use tagbridge_hardware::mock::MockSerial;
//!
//! let (serial, _handle) = MockSerial::new();
//! let ports = serial.available_ports()?;
//! let signatures = vec!["ftdi".to_string()];
//! if let Some(port) = select_port(&ports, &signatures) {
//!     println!("would use {port}");
//! }
//! # Ok::<(), tagbridge_hardware::HardwareError>(())
//! ```
//!
//! [`CardService`]: traits::CardService
//! [`SerialBackend`]: traits::SerialBackend

pub mod card;
pub mod devices;
pub mod error;
pub mod manager;
pub mod mock;
pub mod scanner;
pub mod traits;
pub mod types;

#[cfg(feature = "hardware-pcsc")]
pub mod pcsc_service;
#[cfg(feature = "hardware-serial")]
pub mod system_serial;

// Re-export commonly used types for convenience
pub use error::{HardwareError, Result};
pub use traits::{CardService, CardServiceEvent, SerialBackend, SerialPort};
pub use types::PortDescriptor;

pub use card::CardAdapter;
pub use manager::{AdapterConfig, AdapterHandle, AdapterManager, AdapterStats};
pub use scanner::{ScannerAdapter, ScannerConfig, ScannerState};
