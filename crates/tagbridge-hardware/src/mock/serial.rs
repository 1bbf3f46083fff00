//! Mock serial backend for testing and development.
//!
//! The backend keeps a list of fake ports and, once a port is opened, a
//! channel through which the paired handle feeds bytes, errors or a close.

use crate::{
    HardwareError, Result,
    traits::{SerialBackend, SerialPort},
    types::PortDescriptor,
};
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct MockSerialState {
    ports: Vec<PortDescriptor>,
    open_attempts: Vec<String>,
    failing_opens: usize,
    connection: Option<mpsc::Sender<Result<Bytes>>>,
}

fn lock(shared: &Mutex<MockSerialState>) -> MutexGuard<'_, MockSerialState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock serial backend.
///
/// # Examples
///
/// ```
/// use tagbridge_hardware::mock::MockSerial;
/// use tagbridge_hardware::traits::{SerialBackend, SerialPort};
/// use tagbridge_hardware::PortDescriptor;
///
/// #[tokio::main]
/// async fn main() -> tagbridge_hardware::Result<()> {
///     let (backend, handle) = MockSerial::new();
///     handle.add_port(PortDescriptor::new("/dev/ttyUSB0"));
///
///     let mut port = backend.open("/dev/ttyUSB0", 9600).await?;
///     handle.send(b"ABC123\r").await?;
///
///     assert_eq!(port.read_chunk().await?.as_deref(), Some(&b"ABC123\r"[..]));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockSerial {
    shared: Arc<Mutex<MockSerialState>>,
}

impl MockSerial {
    /// Create a backend with no ports and its control handle.
    pub fn new() -> (Self, MockSerialHandle) {
        let shared = Arc::new(Mutex::new(MockSerialState::default()));
        (
            Self {
                shared: shared.clone(),
            },
            MockSerialHandle { shared },
        )
    }
}

impl SerialBackend for MockSerial {
    type Port = MockSerialPort;

    fn available_ports(&self) -> Result<Vec<PortDescriptor>> {
        Ok(lock(&self.shared).ports.clone())
    }

    async fn open(&self, name: &str, _baud_rate: u32) -> Result<MockSerialPort> {
        let mut state = lock(&self.shared);
        state.open_attempts.push(name.to_string());

        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(HardwareError::open_failed(name, "simulated open failure"));
        }
        if !state.ports.iter().any(|port| port.name == name) {
            return Err(HardwareError::not_found(name));
        }

        let (data_tx, data_rx) = mpsc::channel(32);
        state.connection = Some(data_tx);
        Ok(MockSerialPort { data_rx })
    }
}

/// Port opened on a [`MockSerial`] backend.
#[derive(Debug)]
pub struct MockSerialPort {
    data_rx: mpsc::Receiver<Result<Bytes>>,
}

impl SerialPort for MockSerialPort {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.data_rx.recv().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Handle for controlling a [`MockSerial`] backend.
#[derive(Debug, Clone)]
pub struct MockSerialHandle {
    shared: Arc<Mutex<MockSerialState>>,
}

impl MockSerialHandle {
    /// Make a port appear in the enumeration.
    pub fn add_port(&self, port: PortDescriptor) {
        lock(&self.shared).ports.push(port);
    }

    /// Remove a port from the enumeration. The open connection, if any, is
    /// left alone; use [`disconnect`](Self::disconnect) to simulate unplugging.
    pub fn remove_port(&self, name: &str) {
        lock(&self.shared).ports.retain(|port| port.name != name);
    }

    /// Make the next `count` open attempts fail.
    pub fn fail_next_opens(&self, count: usize) {
        lock(&self.shared).failing_opens = count;
    }

    /// Number of open attempts so far, successful or not.
    pub fn open_attempts(&self) -> usize {
        lock(&self.shared).open_attempts.len()
    }

    /// Port names passed to every open attempt, in order.
    pub fn opened_ports(&self) -> Vec<String> {
        lock(&self.shared).open_attempts.clone()
    }

    /// Whether a port is currently open.
    pub fn is_connected(&self) -> bool {
        lock(&self.shared)
            .connection
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Deliver bytes to the open port.
    pub async fn send(&self, bytes: &[u8]) -> Result<()> {
        self.deliver(Ok(Bytes::copy_from_slice(bytes))).await
    }

    /// Make the open port fail its next read.
    pub async fn inject_error(&self, message: impl Into<String>) -> Result<()> {
        self.deliver(Err(HardwareError::communication(message))).await
    }

    /// Close the open port as if the device was unplugged.
    pub fn disconnect(&self) {
        lock(&self.shared).connection = None;
    }

    async fn deliver(&self, item: Result<Bytes>) -> Result<()> {
        let tx = lock(&self.shared)
            .connection
            .clone()
            .ok_or_else(|| HardwareError::disconnected("mock serial port"))?;
        tx.send(item)
            .await
            .map_err(|_| HardwareError::disconnected("mock serial port"))
    }
}
