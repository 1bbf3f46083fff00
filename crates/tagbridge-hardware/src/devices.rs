//! Enum wrappers for hardware backend dispatch.
//!
//! Native `async fn` in traits (RPITIT - Rust Edition 2024) are not
//! object-safe, so `Box<dyn CardService>` is not an option. The enums below
//! provide concrete type dispatch instead, with one variant per backend.
//! Real backends are compiled in through the `hardware-pcsc` and
//! `hardware-serial` features.
//!
//! # Examples
//!
//! ```
//! use tagbridge_hardware::devices::AnySerialBackend;
//! use tagbridge_hardware::mock::MockSerial;
//!
//! let (serial, _handle) = MockSerial::new();
//! let backend = AnySerialBackend::Mock(serial);
//! ```

use crate::mock::{MockCardService, MockSerial, MockSerialPort};
use crate::traits::{CardService, CardServiceEvent, SerialBackend, SerialPort};
use crate::{PortDescriptor, Result};
use bytes::Bytes;

#[cfg(feature = "hardware-pcsc")]
use crate::pcsc_service::PcscCardService;
#[cfg(feature = "hardware-serial")]
use crate::system_serial::{SystemSerial, SystemSerialPort};

/// Enum wrapper for card service dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyCardService {
    /// Mock service for development and testing.
    Mock(MockCardService),

    /// PC/SC resource manager.
    #[cfg(feature = "hardware-pcsc")]
    Pcsc(PcscCardService),
}

impl CardService for AnyCardService {
    async fn next_event(&mut self) -> Option<CardServiceEvent> {
        match self {
            Self::Mock(service) => service.next_event().await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(service) => service.next_event().await,
        }
    }
}

/// Enum wrapper for serial backend dispatch.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnySerialBackend {
    /// Mock backend for development and testing.
    Mock(MockSerial),

    /// Serial ports of the host OS.
    #[cfg(feature = "hardware-serial")]
    System(SystemSerial),
}

impl SerialBackend for AnySerialBackend {
    type Port = AnySerialPort;

    fn available_ports(&self) -> Result<Vec<PortDescriptor>> {
        match self {
            Self::Mock(backend) => backend.available_ports(),
            #[cfg(feature = "hardware-serial")]
            Self::System(backend) => backend.available_ports(),
        }
    }

    async fn open(&self, name: &str, baud_rate: u32) -> Result<AnySerialPort> {
        match self {
            Self::Mock(backend) => backend.open(name, baud_rate).await.map(AnySerialPort::Mock),
            #[cfg(feature = "hardware-serial")]
            Self::System(backend) => backend
                .open(name, baud_rate)
                .await
                .map(AnySerialPort::System),
        }
    }
}

/// Enum wrapper for open serial ports.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnySerialPort {
    /// Port opened on the mock backend.
    Mock(MockSerialPort),

    /// Port opened on the host OS.
    #[cfg(feature = "hardware-serial")]
    System(SystemSerialPort),
}

impl SerialPort for AnySerialPort {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        match self {
            Self::Mock(port) => port.read_chunk().await,
            #[cfg(feature = "hardware-serial")]
            Self::System(port) => port.read_chunk().await,
        }
    }
}
