//! APDU response definitions
//!
//! A response APDU is an optional body followed by the two status bytes
//! SW1 SW2, according to ISO/IEC 7816-4.

pub mod error;
pub mod status;
pub mod utils;

use bytes::{BufMut, Bytes, BytesMut};

use status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data
    payload: Option<Bytes>,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(payload: Option<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload: payload.filter(|p| !p.is_empty()),
            status: status.into(),
        }
    }

    /// Get the response payload data
    pub const fn payload(&self) -> &Option<Bytes> {
        &self.payload
    }

    /// Get the status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Serialize back to raw response bytes: body followed by SW1 SW2
    pub fn to_bytes(&self) -> Bytes {
        let body = self.payload.as_deref().unwrap_or_default();
        let mut buf = BytesMut::with_capacity(body.len() + 2);
        buf.put_slice(body);
        buf.put_u8(self.status.sw1);
        buf.put_u8(self.status.sw2);
        buf.freeze()
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        response.to_bytes()
    }
}
