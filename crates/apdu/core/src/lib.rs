//! Core traits and types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types and traits for exchanging
//! plain ISO/IEC 7816-4 command and response APDUs with a health card.
//!
//! ## Overview
//!
//! - [`Command`] builds and serializes command APDUs in short or extended form
//! - [`Response`] pairs a response payload with its [`StatusWord`]
//! - [`CardTransport`] is the raw duplex byte link to the card
//!
//! Secure messaging is layered on top of these types by `healthcard-sm`.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;
pub mod transport;

pub use command::{Command, ExpectedLength, error::CommandError};
pub use response::error::ResponseError;
pub use response::status::StatusWord;
pub use response::{Response, utils};
pub use transport::{CardTransport, TransportError};
