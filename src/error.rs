//! Error types for the presence gateway
//!
//! Only configuration problems are hard failures. I/O and framing problems are
//! recovered inside the gateway and surface as log records, counters and
//! connectivity notifications; the variants below exist for the places where
//! a caller does get a `Result` back. Connect and socket failures never reach
//! a caller: the supervisor retries them.

use thiserror::Error;

use crate::config::DeviceAddress;

/// Result type used throughout the crate
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Invalid gateway configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Address is not part of the configured device set
    #[error("Unknown device address: {address}")]
    UnknownDevice { address: DeviceAddress },

    /// Malformed or corrupted frame
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Runtime or task lifecycle problem
    #[error("Runtime error: {message}")]
    Runtime { message: String },
}

impl GatewayError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unknown device error
    pub fn unknown_device(address: DeviceAddress) -> Self {
        Self::UnknownDevice { address }
    }

    /// Create a frame error
    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Create a runtime error
    pub fn runtime<S: Into<String>>(message: S) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = GatewayError::configuration("no device addresses configured");
        assert_eq!(
            err.to_string(),
            "Configuration error: no device addresses configured"
        );

        let err = GatewayError::unknown_device(42);
        assert_eq!(err.to_string(), "Unknown device address: 42");
    }

    #[test]
    fn test_frame_error_message() {
        let err = GatewayError::frame("CRC mismatch: 03 03 02");
        assert!(matches!(err, GatewayError::Frame { .. }));
        assert_eq!(err.to_string(), "Frame error: CRC mismatch: 03 03 02");
    }
}
