//! Error types for secure messaging

use healthcard_apdu_core::TransportError;
use thiserror::Error;

/// Result type for secure messaging operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for secure messaging operations
///
/// Every variant invalidates the session it was raised in.
#[derive(Debug, Error)]
pub enum Error {
    /// A value does not fit the wire format (object or APDU too long, bad padding)
    #[error("Encoding error: {0}")]
    Encoding(&'static str),

    /// Invalid key material or a cipher failure
    #[error("Cryptographic error: {0}")]
    Crypto(&'static str),

    /// The response MAC does not match
    #[error("MAC verification failed")]
    MacVerification,

    /// The response violates the secure messaging structure
    #[error("Protocol error: {0}")]
    Protocol(&'static str),

    /// The underlying transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session was invalidated by an earlier failure
    #[error("Secure messaging session invalidated")]
    SessionInvalid,
}

impl Error {
    /// Whether this error indicates tampering or a desynchronized peer
    pub const fn is_security_fatal(&self) -> bool {
        matches!(self, Self::MacVerification)
    }
}
