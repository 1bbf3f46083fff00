//! Shared constants for the bridge.
//!
//! Defaults mirror what the browser front-end and the deployed devices
//! expect, so changing them usually means changing the clients too.
//!
//! ```
//! use tagbridge_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(DEFAULT_LISTEN_PORT, 3000);
//! let backoff = Duration::from_millis(SCANNER_RETRY_INTERVAL_MS);
//! assert_eq!(backoff.as_secs(), 3);
//! ```

// ============================================================================
// Observer transport
// ============================================================================

/// Port the browser clients connect to.
pub const DEFAULT_LISTEN_PORT: u16 = 3000;

/// Maximum simultaneous observer connections.
pub const DEFAULT_MAX_OBSERVERS: usize = 100;

/// Outbound messages buffered per observer before broadcasts start
/// skipping it.
pub const DEFAULT_OBSERVER_QUEUE_CAPACITY: usize = 64;

/// Observer commands waiting for the router.
pub const COMMAND_CHANNEL_CAPACITY: usize = 100;

// ============================================================================
// Alias store
// ============================================================================

/// File holding the identifier → alias table.
pub const DEFAULT_ALIAS_FILE: &str = "aliases.json";

// ============================================================================
// Scanner
// ============================================================================

/// Delay between scanner connection attempts (milliseconds).
pub const SCANNER_RETRY_INTERVAL_MS: u64 = 3000;

/// Baud rate used when opening the scanner port.
pub const DEFAULT_SCANNER_BAUD_RATE: u32 = 9600;

/// Longest line accepted from the scanner before the buffer is discarded.
pub const MAX_SCAN_LINE_LENGTH: usize = 4096;

/// Descriptor fragments identifying barcode scanners and the USB-serial
/// bridges they commonly ship with. Matched case-insensitively against the
/// manufacturer and product strings and the 4-digit hex USB vendor ID.
pub const SCANNER_VENDOR_SIGNATURES: &[&str] = &[
    "honeywell",
    "metrologic",
    "zebra",
    "symbol",
    "datalogic",
    "newland",
    "ftdi",
    "prolific",
    "silicon labs",
    "cp210",
    "wch",
    "ch340",
    // USB vendor IDs: FTDI, Prolific, Silicon Labs, WCH, Honeywell, Zebra
    "0403",
    "067b",
    "10c4",
    "1a86",
    "0c2e",
    "05e0",
];

// ============================================================================
// Adapters
// ============================================================================

/// Capacity of the channel carrying observed identifiers to the router.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// APDU asking a PC/SC reader for the UID of the card in the field.
pub const GET_UID_APDU: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];
