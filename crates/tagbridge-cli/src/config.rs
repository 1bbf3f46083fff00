//! Command-line arguments and the configuration built from them.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tagbridge_core::constants::{
    DEFAULT_ALIAS_FILE, DEFAULT_MAX_OBSERVERS, DEFAULT_OBSERVER_QUEUE_CAPACITY,
    DEFAULT_SCANNER_BAUD_RATE, SCANNER_RETRY_INTERVAL_MS,
};
use tagbridge_core::{Error, Result};
use tagbridge_hardware::{AdapterConfig, ScannerConfig};
use tagbridge_hub::ServerConfig;
use tagbridge_storage::StoreConfig;

/// Bridge a card reader and a barcode scanner to browser observers.
#[derive(Parser, Debug)]
#[command(name = "tagbridge", version)]
pub struct Args {
    /// Address the WebSocket server listens on
    #[arg(short, long, env = "TAGBRIDGE_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// JSON file holding the alias table
    #[arg(short, long, env = "TAGBRIDGE_ALIAS_FILE", default_value = DEFAULT_ALIAS_FILE)]
    pub alias_file: PathBuf,

    /// Scanner serial port; discovered automatically when omitted
    #[arg(long, env = "TAGBRIDGE_SERIAL_PORT")]
    pub serial_port: Option<String>,

    /// Scanner baud rate
    #[arg(long, env = "TAGBRIDGE_BAUD_RATE", default_value_t = DEFAULT_SCANNER_BAUD_RATE)]
    pub baud_rate: u32,

    /// Seconds between scanner connection attempts
    #[arg(long, env = "TAGBRIDGE_RETRY_SECS", default_value_t = SCANNER_RETRY_INTERVAL_MS / 1000)]
    pub retry_secs: u64,

    /// Maximum simultaneous observers
    #[arg(long, env = "TAGBRIDGE_MAX_OBSERVERS", default_value_t = DEFAULT_MAX_OBSERVERS)]
    pub max_observers: usize,

    /// Do not start the card reader adapter
    #[arg(long)]
    pub no_card: bool,

    /// Do not start the barcode scanner adapter
    #[arg(long)]
    pub no_scanner: bool,

    /// Log filter (e.g. "debug", "tagbridge_hub=trace"); overrides RUST_LOG
    #[arg(long, env = "TAGBRIDGE_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Args {
    pub fn into_config(self) -> BridgeConfig {
        let mut scanner = ScannerConfig::default()
            .baud_rate(self.baud_rate)
            .retry_interval(Duration::from_secs(self.retry_secs));
        if let Some(port) = self.serial_port {
            scanner = scanner.port(port);
        }

        BridgeConfig {
            store: StoreConfig::new(self.alias_file),
            server: ServerConfig::default()
                .bind_addr(self.listen)
                .max_connections(self.max_observers),
            adapters: AdapterConfig {
                card_enabled: !self.no_card,
                scanner_enabled: !self.no_scanner,
                scanner,
            },
            observer_queue_capacity: DEFAULT_OBSERVER_QUEUE_CAPACITY,
        }
    }
}

/// Everything the bridge needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub adapters: AdapterConfig,
    /// Frames buffered per observer before broadcasts skip it.
    pub observer_queue_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            server: ServerConfig::default(),
            adapters: AdapterConfig::default(),
            observer_queue_capacity: DEFAULT_OBSERVER_QUEUE_CAPACITY,
        }
    }
}

impl BridgeConfig {
    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.store.path.as_os_str().is_empty() {
            return Err(Error::Config("alias file path is empty".to_string()));
        }
        if self.server.max_connections == 0 {
            return Err(Error::Config("max observers must be at least 1".to_string()));
        }
        if self.observer_queue_capacity == 0 {
            return Err(Error::Config("observer queue capacity must be at least 1".to_string()));
        }
        let scanner = &self.adapters.scanner;
        if self.adapters.scanner_enabled {
            if scanner.baud_rate == 0 {
                return Err(Error::Config("baud rate must be positive".to_string()));
            }
            if scanner.retry_interval.is_zero() {
                return Err(Error::Config(
                    "scanner retry interval must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}
