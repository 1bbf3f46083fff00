//! Error types for hardware operations.
//!
//! These errors are transient by nature: the adapters log them and keep
//! running (the scanner retries, the card adapter waits for the next event).
//! None of them is ever surfaced to observers.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// No device with the requested name exists.
    #[error("Device not found: {device}")]
    NotFound { device: String },

    /// Opening a device failed.
    #[error("Failed to open {device}: {message}")]
    OpenFailed { device: String, message: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Device service could not be started.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new not found error.
    pub fn not_found(device: impl Into<String>) -> Self {
        Self::NotFound {
            device: device.into(),
        }
    }

    /// Create a new open failed error.
    pub fn open_failed(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenFailed {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }
}
