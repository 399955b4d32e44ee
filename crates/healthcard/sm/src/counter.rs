//! Send sequence counter

use std::fmt;

use crate::crypto::Block;
use crate::{Error, Result};

/// 16-byte big-endian send sequence counter
///
/// Incremented once before protecting a command and once before verifying the
/// response. It never wraps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceCounter(u128);

impl SequenceCounter {
    /// Counter starting at zero, as established by PACE
    pub const fn new() -> Self {
        Self(0)
    }

    /// Counter starting at an explicit value
    pub const fn from_value(value: u128) -> Self {
        Self(value)
    }

    /// Counter from its 16-byte big-endian encoding
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let block: Block = bytes
            .try_into()
            .map_err(|_| Error::Encoding("sequence counter must be 16 bytes"))?;
        Ok(Self(u128::from_be_bytes(block)))
    }

    /// Current value
    pub const fn value(&self) -> u128 {
        self.0
    }

    /// Big-endian encoding, as fed into IV derivation and the MAC
    pub const fn to_bytes(&self) -> Block {
        self.0.to_be_bytes()
    }

    /// Advance by one
    pub fn increment(&mut self) -> Result<()> {
        self.0 = self
            .0
            .checked_add(1)
            .ok_or(Error::Crypto("sequence counter exhausted"))?;
        Ok(())
    }
}

impl fmt::Display for SequenceCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032X}", self.0)
    }
}
