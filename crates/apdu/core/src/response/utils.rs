//! Utility functions for APDU response handling

use tracing::debug;

use crate::response::error::ResponseError;
use crate::response::status::StatusWord;

/// Split raw response data into the status word and the body in front of it
///
/// # Errors
/// Returns [`ResponseError::Incomplete`] if the data is too short to contain a
/// status word.
pub fn extract_status_and_payload(data: &[u8]) -> Result<(StatusWord, &[u8]), ResponseError> {
    match data {
        [payload @ .., sw1, sw2] => Ok((StatusWord::new(*sw1, *sw2), payload)),
        _ => {
            debug!("Response too short: {} bytes", data.len());
            Err(ResponseError::Incomplete)
        }
    }
}
