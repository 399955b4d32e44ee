//! Secure messaging for contactless health cards
//!
//! This crate protects every command APDU exchanged with a health card after
//! PACE has produced a pair of AES session keys. Commands are wrapped into
//! encrypted, MAC-protected BER-TLV data objects, responses are verified and
//! decrypted, and the send sequence counter is advanced exactly twice per
//! round trip.
//!
//! The layers, from the bottom up:
//!
//! - [`tlv`]: the closed set of secure messaging data objects
//! - [`padding`]: ISO/IEC 9797-1 padding method 2
//! - [`crypto`]: AES block, AES-CBC and AES-CMAC over session keys
//! - [`engine`]: the stateless encrypt/decrypt pipeline
//! - [`Session`]: keys, counter and lifecycle state
//! - [`SecureChannel`]: a session bound to a [`CardTransport`]
//!
//! ```no_run
//! use healthcard_apdu_core::{CardTransport, Command};
//! use healthcard_sm::{SecureChannel, SessionKeys};
//!
//! fn read_version<T: CardTransport>(
//!     transport: T,
//!     enc: &[u8],
//!     mac: &[u8],
//! ) -> healthcard_sm::Result<()> {
//!     let channel = SecureChannel::new(transport, SessionKeys::new(enc, mac)?);
//!     let response = channel.transmit(&Command::new_with_le(0x00, 0xB0, 0x91, 0x00, 0))?;
//!     println!("{} bytes, status {}", response.data.len(), response.status);
//!     Ok(())
//! }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

// Only used by the sm-tool binary
#[cfg(feature = "cli")]
use clap as _;
#[cfg(feature = "cli")]
use tracing_subscriber as _;

pub mod channel;
pub mod config;
pub mod counter;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod keys;
pub mod padding;
pub mod session;
pub mod tlv;

pub use channel::SecureChannel;
pub use config::ChannelConfig;
pub use counter::SequenceCounter;
pub use engine::{PlainResponse, WireCommand, WireResponse};
pub use error::{Error, Result};
pub use keys::SessionKeys;
pub use session::{Session, SessionState};
pub use tlv::{Tag, TaggedObject};

pub use healthcard_apdu_core::{CardTransport, Command, StatusWord, TransportError};
