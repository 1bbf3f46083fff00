//! Mock device implementations for testing and development.
//!
//! This module provides simulated backends that can be controlled
//! programmatically without requiring physical hardware.

pub mod card;
pub mod serial;

// Re-export commonly used types
pub use card::{MockCardService, MockCardServiceHandle};
pub use serial::{MockSerial, MockSerialHandle, MockSerialPort};
