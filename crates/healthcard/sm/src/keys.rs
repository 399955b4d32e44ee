//! Session keys

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::is_valid_key_len;
use crate::{Error, Result};

/// AES session keys negotiated by PACE
///
/// Wiped on drop; `Debug` prints only the key lengths.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Encryption key
    enc: Vec<u8>,
    /// MAC key
    mac: Vec<u8>,
}

impl SessionKeys {
    /// Create a key set from the encryption and MAC keys
    ///
    /// Each key must be 16, 24 or 32 bytes long.
    pub fn new(enc: &[u8], mac: &[u8]) -> Result<Self> {
        if !is_valid_key_len(enc.len()) {
            return Err(Error::Crypto("invalid encryption key length"));
        }
        if !is_valid_key_len(mac.len()) {
            return Err(Error::Crypto("invalid MAC key length"));
        }
        Ok(Self {
            enc: enc.to_vec(),
            mac: mac.to_vec(),
        })
    }

    /// Get the encryption key
    pub(crate) fn enc(&self) -> &[u8] {
        &self.enc
    }

    /// Get the MAC key
    pub(crate) fn mac(&self) -> &[u8] {
        &self.mac
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("enc", &format_args!("<{} bytes>", self.enc.len()))
            .field("mac", &format_args!("<{} bytes>", self.mac.len()))
            .finish()
    }
}
