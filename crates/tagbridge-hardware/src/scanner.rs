//! Barcode scanner adapter.
//!
//! Keeps a connection to a line-oriented serial scanner and turns every
//! non-empty line into an [`ObservedEvent`] with [`Source::Scanner`].
//!
//! # States
//!
//! - `Searching`: no port is open; looking for one
//! - `Connecting`: a port was chosen and is being opened
//! - `Connected`: lines are being read
//!
//! # Valid Transitions
//!
//! - Searching → Connecting → Connected → Searching
//! - Connecting → Searching (open failed)
//!
//! Every return to `Searching` is followed by a fixed backoff before the
//! next attempt. The loop, its timer and the open port are owned by a single
//! task, so two connection attempts can never overlap. Cancelling the
//! shutdown token stops the task, including a pending backoff.
//!
//! # Port Discovery
//!
//! With a fixed port configured, that port is always tried. Otherwise the
//! enumeration is searched for a descriptor matching a known scanner or
//! USB-serial vendor, falling back to the last port listed.

use crate::traits::{SerialBackend, SerialPort};
use crate::{HardwareError, PortDescriptor, Result};
use bytes::BytesMut;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tagbridge_core::constants::{
    DEFAULT_SCANNER_BAUD_RATE, MAX_SCAN_LINE_LENGTH, SCANNER_RETRY_INTERVAL_MS,
    SCANNER_VENDOR_SIGNATURES,
};
use tagbridge_core::{AliasLookup, Identifier, ObservedEvent, Source};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{AnyDelimiterCodec, Decoder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Connection state of the scanner adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerState {
    /// No port open; waiting for the next attempt.
    Searching,

    /// Opening `port`.
    Connecting { port: String },

    /// Reading lines from `port`.
    Connected { port: String },
}

impl fmt::Display for ScannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerState::Searching => write!(f, "Searching"),
            ScannerState::Connecting { port } => write!(f, "Connecting({})", port),
            ScannerState::Connected { port } => write!(f, "Connected({})", port),
        }
    }
}

impl ScannerState {
    /// Check if transition to `target` is allowed from this state.
    pub fn can_transition_to(&self, target: &ScannerState) -> bool {
        use ScannerState::*;

        matches!(
            (self, target),
            (Searching, Connecting { .. })
                | (Connecting { .. }, Connected { .. })
                | (Connecting { .. }, Searching)
                | (Connected { .. }, Searching)
        )
    }

    /// Port involved in the current state, if any.
    pub fn port(&self) -> Option<&str> {
        match self {
            ScannerState::Searching => None,
            ScannerState::Connecting { port } | ScannerState::Connected { port } => Some(port),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ScannerState::Connected { .. })
    }
}

/// Scanner adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Fixed port to use. Disables discovery when set.
    pub port: Option<String>,

    /// Baud rate the port is opened with.
    pub baud_rate: u32,

    /// Delay between connection attempts.
    pub retry_interval: Duration,

    /// Lowercase descriptor fragments preferred during discovery.
    pub vendor_signatures: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_SCANNER_BAUD_RATE,
            retry_interval: Duration::from_millis(SCANNER_RETRY_INTERVAL_MS),
            vendor_signatures: SCANNER_VENDOR_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ScannerConfig {
    /// Use a fixed port instead of discovery.
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Set the baud rate.
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the delay between connection attempts.
    pub fn retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }
}

/// Pick the port to try from an enumeration.
///
/// Prefers the first port matching one of `signatures`, else the last port
/// listed. Returns `None` for an empty list.
///
/// ```
/// use tagbridge_hardware::PortDescriptor;
/// use tagbridge_hardware::scanner::select_port;
///
/// let ports = vec![
///     PortDescriptor::new("COM1"),
///     PortDescriptor::new("COM4").with_manufacturer("Honeywell"),
///     PortDescriptor::new("COM7"),
/// ];
/// let signatures = vec!["honeywell".to_string()];
///
/// assert_eq!(select_port(&ports, &signatures).unwrap().name, "COM4");
/// assert_eq!(select_port(&ports[..1], &signatures).unwrap().name, "COM1");
/// assert!(select_port(&[], &signatures).is_none());
/// ```
pub fn select_port<'a>(
    ports: &'a [PortDescriptor],
    signatures: &[String],
) -> Option<&'a PortDescriptor> {
    ports
        .iter()
        .find(|port| port.matches_any(signatures))
        .or_else(|| ports.last())
}

/// Splits the raw byte stream of a scanner into identifiers.
///
/// Lines end at `\r` or `\n`. Each line is trimmed of whitespace and NUL
/// characters; empty lines are discarded. Lines longer than the configured
/// maximum are dropped.
#[derive(Debug)]
pub struct LineFramer {
    codec: AnyDelimiterCodec,
    buffer: BytesMut,
}

impl LineFramer {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            codec: AnyDelimiterCodec::new_with_max_length(
                b"\r\n".to_vec(),
                b"\n".to_vec(),
                max_line_length,
            ),
            buffer: BytesMut::new(),
        }
    }

    /// Feed a chunk and collect the identifiers of every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Identifier> {
        self.buffer.extend_from_slice(chunk);

        let mut identifiers = Vec::new();
        loop {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(line)) => {
                    let text = String::from_utf8_lossy(&line);
                    match Identifier::from_scan(&text) {
                        Some(identifier) => identifiers.push(identifier),
                        None => trace!("Discarding empty scanner line"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // The codec skips the rest of the oversized line on the next call.
                    warn!(error = %e, "Discarding oversized scanner line");
                }
            }
        }
        identifiers
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(MAX_SCAN_LINE_LENGTH)
    }
}

/// Why a connected session ended.
enum SessionEnd {
    Shutdown,
    Closed,
    Failed(HardwareError),
    EventsDropped,
}

/// Serial barcode scanner adapter.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tagbridge_core::AliasTable;
/// use tagbridge_hardware::mock::MockSerial;
/// use tagbridge_hardware::scanner::{ScannerAdapter, ScannerConfig};
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> tagbridge_hardware::Result<()> {
///     let (serial, _handle) = MockSerial::new();
///     let (events_tx, mut events_rx) = mpsc::channel(16);
///
///     let adapter = ScannerAdapter::new(
///         serial,
///         ScannerConfig::default().port("/dev/ttyUSB0"),
///         Arc::new(AliasTable::new()),
///         events_tx,
///     );
///
///     let shutdown = CancellationToken::new();
///     tokio::spawn(adapter.run(shutdown.clone()));
///
///     while let Some(event) = events_rx.recv().await {
///         println!("scanned {}", event.identifier);
///     }
///     Ok(())
/// }
/// ```
pub struct ScannerAdapter<B: SerialBackend> {
    backend: B,
    config: ScannerConfig,
    lookup: Arc<dyn AliasLookup>,
    events: mpsc::Sender<ObservedEvent>,
    state: watch::Sender<ScannerState>,
}

impl<B: SerialBackend> ScannerAdapter<B> {
    pub fn new(
        backend: B,
        config: ScannerConfig,
        lookup: Arc<dyn AliasLookup>,
        events: mpsc::Sender<ObservedEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ScannerState::Searching);
        Self {
            backend,
            config,
            lookup,
            events,
            state,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ScannerState {
        self.state.borrow().clone()
    }

    /// Watch connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ScannerState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` is cancelled or the event receiver is dropped.
    ///
    /// Device errors never end the loop; they send the adapter back to
    /// `Searching`.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            port = self.config.port.as_deref().unwrap_or("auto"),
            baud_rate = self.config.baud_rate,
            retry_ms = self.config.retry_interval.as_millis() as u64,
            "Scanner adapter started"
        );

        loop {
            if let Some(port) = self.discover() {
                let end = self.connect(&port, &shutdown).await;
                self.transition(ScannerState::Searching);
                match end {
                    Some(SessionEnd::Shutdown) => break,
                    Some(SessionEnd::EventsDropped) => {
                        debug!("Event receiver dropped, stopping scanner adapter");
                        break;
                    }
                    Some(SessionEnd::Closed) => info!(port = %port, "Scanner disconnected"),
                    Some(SessionEnd::Failed(e)) => {
                        warn!(port = %port, error = %e, "Scanner connection lost")
                    }
                    None => {}
                }
            }

            debug!(
                retry_ms = self.config.retry_interval.as_millis() as u64,
                "Waiting before next scanner attempt"
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.retry_interval) => {}
            }
        }

        info!("Scanner adapter stopped");
        Ok(())
    }

    /// Choose the port to try, or `None` to stay in `Searching`.
    fn discover(&self) -> Option<String> {
        if let Some(port) = &self.config.port {
            return Some(port.clone());
        }

        let ports = match self.backend.available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!(error = %e, "Failed to list serial ports");
                return None;
            }
        };

        match select_port(&ports, &self.config.vendor_signatures) {
            Some(port) => {
                debug!(port = %port, candidates = ports.len(), "Selected scanner port");
                Some(port.name.clone())
            }
            None => {
                debug!("No serial ports available");
                None
            }
        }
    }

    /// Open `port` and read from it until the session ends.
    ///
    /// Returns `None` when the port could not be opened.
    async fn connect(&self, port: &str, shutdown: &CancellationToken) -> Option<SessionEnd> {
        self.transition(ScannerState::Connecting {
            port: port.to_string(),
        });

        let opened = tokio::select! {
            _ = shutdown.cancelled() => return Some(SessionEnd::Shutdown),
            opened = self.backend.open(port, self.config.baud_rate) => opened,
        };

        match opened {
            Ok(mut serial) => {
                self.transition(ScannerState::Connected {
                    port: port.to_string(),
                });
                info!(port = %port, "Scanner connected");
                Some(self.read_lines(&mut serial, shutdown).await)
            }
            Err(e) => {
                warn!(port = %port, error = %e, "Failed to open scanner port");
                None
            }
        }
    }

    async fn read_lines(&self, serial: &mut B::Port, shutdown: &CancellationToken) -> SessionEnd {
        let mut framer = LineFramer::default();

        loop {
            let chunk = tokio::select! {
                _ = shutdown.cancelled() => return SessionEnd::Shutdown,
                chunk = serial.read_chunk() => chunk,
            };

            match chunk {
                Ok(Some(bytes)) => {
                    trace!(len = bytes.len(), "Scanner chunk received");
                    for identifier in framer.push(&bytes) {
                        if !self.emit(identifier).await {
                            return SessionEnd::EventsDropped;
                        }
                    }
                }
                Ok(None) => return SessionEnd::Closed,
                Err(e) => return SessionEnd::Failed(e),
            }
        }
    }

    async fn emit(&self, identifier: Identifier) -> bool {
        let known_name = self.lookup.lookup(&identifier);
        info!(
            identifier = %identifier,
            known_name = known_name.as_deref().unwrap_or(""),
            "Barcode scanned"
        );
        let event = ObservedEvent::new(identifier, Source::Scanner, known_name);
        self.events.send(event).await.is_ok()
    }

    fn transition(&self, next: ScannerState) {
        let current = self.state.borrow().clone();
        if !current.can_transition_to(&next) {
            error!(from = %current, to = %next, "Invalid scanner state transition");
        }
        debug!(from = %current, to = %next, "Scanner state change");
        self.state.send_replace(next);
    }
}
