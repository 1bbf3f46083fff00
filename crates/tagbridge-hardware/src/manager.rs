//! Device adapter manager.
//!
//! This module provides the `AdapterManager`, which runs the card reader and
//! barcode scanner adapters and merges their observations into a single
//! stream for the observer hub.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐       ┌─────────────────┐
//! │ Card     │──────►│                 │
//! │ Adapter  │       │  Event Channel  │
//! └──────────┘       │  (mpsc)         │──────► Hub
//!                    │                 │
//! ┌──────────┐       │                 │
//! │ Scanner  │──────►│                 │
//! │ Adapter  │       └─────────────────┘
//! └──────────┘
//! ```
//!
//! Each adapter runs in its own task. All tasks share one cancellation
//! token, so [`AdapterHandle::shutdown`] stops pending reads and backoff
//! timers alike.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tagbridge_core::AliasTable;
//! use tagbridge_hardware::devices::{AnyCardService, AnySerialBackend};
//! use tagbridge_hardware::manager::{AdapterConfig, AdapterManager};
//! use tagbridge_hardware::mock::{MockCardService, MockSerial};
//!
//! #[tokio::main]
//! async fn main() -> tagbridge_hardware::Result<()> {
//!     let mut manager = AdapterManager::new(AdapterConfig::default());
//!
//!     let (card, _card_handle) = MockCardService::new();
//!     manager.register_card_service(AnyCardService::Mock(card));
//!     let (serial, _serial_handle) = MockSerial::new();
//!     manager.register_serial_backend(AnySerialBackend::Mock(serial));
//!
//!     let mut handle = manager.start(Arc::new(AliasTable::new()));
//!
//!     while let Some(event) = handle.recv().await {
//!         println!("{} from {}", event.identifier, event.source);
//!     }
//!
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::card::CardAdapter;
use crate::devices::{AnyCardService, AnySerialBackend};
use crate::scanner::{ScannerAdapter, ScannerConfig, ScannerState};
use crate::Result;
use std::sync::Arc;
use tagbridge_core::constants::EVENT_CHANNEL_CAPACITY;
use tagbridge_core::{AliasLookup, ObservedEvent, Source};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which adapters are started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Start the card reader adapter.
    pub card_enabled: bool,

    /// Start the barcode scanner adapter.
    pub scanner_enabled: bool,

    /// Scanner adapter settings.
    pub scanner: ScannerConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            card_enabled: true,
            scanner_enabled: true,
            scanner: ScannerConfig::default(),
        }
    }
}

/// Which backends are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterStats {
    pub card_registered: bool,
    pub scanner_registered: bool,
}

/// Handle to the running adapters.
pub struct AdapterHandle {
    event_rx: Option<mpsc::Receiver<ObservedEvent>>,
    scanner_state: Option<watch::Receiver<ScannerState>>,
    shutdown: CancellationToken,
    tasks: JoinSet<Result<()>>,
}

impl AdapterHandle {
    /// Receive the next observation from any adapter.
    ///
    /// Returns `None` when every adapter has stopped, or after the event
    /// stream was handed out with [`take_events`](Self::take_events).
    pub async fn recv(&mut self) -> Option<ObservedEvent> {
        match self.event_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Hand the observation stream to another consumer.
    ///
    /// The handle keeps control of the adapter tasks.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ObservedEvent>> {
        self.event_rx.take()
    }

    /// Watch the scanner connection state, if the scanner adapter runs.
    pub fn scanner_state(&self) -> Option<watch::Receiver<ScannerState>> {
        self.scanner_state.clone()
    }

    /// Stop every adapter and wait for its task to end.
    ///
    /// Individual adapter failures are logged, not returned.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown.cancel();

        let mut error_count = 0;
        let mut panic_count = 0;

        while let Some(result) = self.tasks.join_next().await {
            match Self::classify_task_result(result) {
                TaskTermination::Success | TaskTermination::Cancelled => {}
                TaskTermination::Error => error_count += 1,
                TaskTermination::Panic => panic_count += 1,
            }
        }

        if error_count + panic_count > 0 {
            warn!(
                errors = error_count,
                panics = panic_count,
                "Adapters stopped with failures"
            );
        } else {
            info!("Adapters stopped");
        }
        Ok(())
    }

    fn classify_task_result(
        result: std::result::Result<Result<()>, tokio::task::JoinError>,
    ) -> TaskTermination {
        match result {
            Ok(Ok(())) => TaskTermination::Success,
            Ok(Err(e)) => {
                warn!(error = %e, "Adapter task failed");
                TaskTermination::Error
            }
            Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
            Err(e) => {
                warn!(error = %e, "Adapter task panicked");
                TaskTermination::Panic
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    Success,
    Error,
    Cancelled,
    Panic,
}

/// Owns the registered backends until the adapters are started.
pub struct AdapterManager {
    card: Option<AnyCardService>,
    serial: Option<AnySerialBackend>,
    config: AdapterConfig,
}

impl AdapterManager {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            card: None,
            serial: None,
            config,
        }
    }

    /// Register the card service. Must be called before `start()`.
    pub fn register_card_service(&mut self, service: AnyCardService) {
        self.card = Some(service);
    }

    /// Register the serial backend. Must be called before `start()`.
    pub fn register_serial_backend(&mut self, backend: AnySerialBackend) {
        self.serial = Some(backend);
    }

    /// Whether the adapter for `source` is enabled in the configuration.
    pub fn is_enabled(&self, source: Source) -> bool {
        match source {
            Source::Card => self.config.card_enabled,
            Source::Scanner => self.config.scanner_enabled,
        }
    }

    pub fn stats(&self) -> AdapterStats {
        AdapterStats {
            card_registered: self.card.is_some(),
            scanner_registered: self.serial.is_some(),
        }
    }

    /// Spawn every enabled adapter that has a backend.
    ///
    /// `lookup` resolves known names at observation time; pass the alias
    /// store so names assigned later are picked up.
    pub fn start(mut self, lookup: Arc<dyn AliasLookup>) -> AdapterHandle {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut scanner_state = None;

        if self.config.card_enabled
            && let Some(service) = self.card.take()
        {
            let adapter = CardAdapter::new(service, lookup.clone(), event_tx.clone());
            tasks.spawn(adapter.run(shutdown.clone()));
        } else if self.config.card_enabled {
            warn!("Card adapter enabled but no card service registered");
        }

        if self.config.scanner_enabled
            && let Some(backend) = self.serial.take()
        {
            let adapter = ScannerAdapter::new(
                backend,
                self.config.scanner.clone(),
                lookup,
                event_tx.clone(),
            );
            scanner_state = Some(adapter.subscribe());
            tasks.spawn(adapter.run(shutdown.clone()));
        } else if self.config.scanner_enabled {
            warn!("Scanner adapter enabled but no serial backend registered");
        }

        debug!(tasks = tasks.len(), "Adapters started");

        AdapterHandle {
            event_rx: Some(event_rx),
            scanner_state,
            shutdown,
            tasks,
        }
    }
}
