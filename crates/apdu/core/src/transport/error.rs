//! Error types specific to card transport

use thiserror::Error;

/// Transport error type
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection error
    #[error("Failed to connect to device")]
    Connection,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// Device error
    #[error("Device error")]
    Device,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Cancelled operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}
