//! Error types specific to APDU responses

use thiserror::Error;

/// Error for APDU response processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// Incomplete response (less than 2 bytes)
    #[error("Incomplete response")]
    Incomplete,
}
