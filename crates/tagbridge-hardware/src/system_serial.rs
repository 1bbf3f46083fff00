//! Serial backend for the host OS, built on the `serialport` crate.
//!
//! `serialport` is blocking, so every open port gets a reader thread that
//! forwards chunks into a channel. The thread exits when the port fails or
//! when the receiving side is dropped.

use crate::traits::{SerialBackend, SerialPort};
use crate::{HardwareError, PortDescriptor, Result};
use bytes::Bytes;
use serialport::{SerialPortInfo, SerialPortType};
use std::io::{ErrorKind, Read};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Read timeout of the blocking port; bounds how long a dropped port keeps
/// its reader thread alive.
const READ_TIMEOUT: Duration = Duration::from_millis(250);

const READ_BUFFER_SIZE: usize = 1024;

/// Serial ports of the host OS.
#[derive(Debug, Clone, Default)]
pub struct SystemSerial;

impl SystemSerial {
    pub fn new() -> Self {
        Self
    }
}

fn describe(info: SerialPortInfo) -> PortDescriptor {
    let mut descriptor = PortDescriptor::new(info.port_name);
    if let SerialPortType::UsbPort(usb) = info.port_type {
        descriptor = descriptor.with_usb_ids(usb.vid, usb.pid);
        if let Some(manufacturer) = usb.manufacturer {
            descriptor = descriptor.with_manufacturer(manufacturer);
        }
        if let Some(product) = usb.product {
            descriptor = descriptor.with_product(product);
        }
    }
    descriptor
}

impl SerialBackend for SystemSerial {
    type Port = SystemSerialPort;

    fn available_ports(&self) -> Result<Vec<PortDescriptor>> {
        let ports = serialport::available_ports()
            .map_err(|e| HardwareError::communication(format!("port enumeration failed: {}", e)))?;
        Ok(ports.into_iter().map(describe).collect())
    }

    async fn open(&self, name: &str, baud_rate: u32) -> Result<SystemSerialPort> {
        let port_name = name.to_string();
        let opened = tokio::task::spawn_blocking(move || {
            serialport::new(port_name, baud_rate)
                .timeout(READ_TIMEOUT)
                .open()
        })
        .await
        .map_err(|e| HardwareError::open_failed(name, e.to_string()))?;

        let port = opened.map_err(|e| HardwareError::open_failed(name, e.to_string()))?;
        SystemSerialPort::spawn(name, port)
    }
}

/// Port opened on the host OS.
#[derive(Debug)]
pub struct SystemSerialPort {
    data_rx: mpsc::Receiver<std::io::Result<Bytes>>,
}

impl SystemSerialPort {
    fn spawn(name: &str, mut port: Box<dyn serialport::SerialPort>) -> Result<Self> {
        let (data_tx, data_rx) = mpsc::channel(32);
        let thread_name = format!("serial-{}", name);
        let port_name = name.to_string();

        std::thread::Builder::new().name(thread_name).spawn(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                match port.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if data_tx
                            .blocking_send(Ok(Bytes::copy_from_slice(&buf[..n])))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::TimedOut => {
                        if data_tx.is_closed() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => {
                        let _ = data_tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
            debug!(port = %port_name, "Serial reader thread stopped");
        })?;

        Ok(Self { data_rx })
    }
}

impl SerialPort for SystemSerialPort {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.data_rx.recv().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(HardwareError::Io(e)),
            None => Ok(None),
        }
    }
}
