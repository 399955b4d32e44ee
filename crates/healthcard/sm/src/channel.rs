//! Secure channel over a card transport
//!
//! [`SecureChannel`] binds a [`Session`] to a [`CardTransport`]. Both live
//! behind one mutex, so each session has at most one exchange in flight and
//! concurrent callers are serialized.

use std::fmt;

use healthcard_apdu_core::{CardTransport, Command};
use parking_lot::Mutex;
use tracing::{debug, instrument, trace, warn};

use crate::config::ChannelConfig;
use crate::counter::SequenceCounter;
use crate::engine::{PlainResponse, WireResponse};
use crate::keys::SessionKeys;
use crate::session::{Session, SessionState};
use crate::Result;

struct Inner<T> {
    transport: T,
    session: Session,
}

/// A secure messaging channel to a card
pub struct SecureChannel<T: CardTransport> {
    inner: Mutex<Inner<T>>,
    config: ChannelConfig,
}

impl<T: CardTransport> fmt::Debug for SecureChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("SecureChannel");
        match self.inner.try_lock() {
            Some(inner) => debug
                .field("transport", &inner.transport)
                .field("state", &inner.session.state())
                .field("ssc", &inner.session.counter()),
            None => debug.field("state", &format_args!("<busy>")),
        };
        debug.field("config", &self.config).finish()
    }
}

impl<T: CardTransport> SecureChannel<T> {
    /// Create a channel with a fresh session for `keys`
    pub fn new(transport: T, keys: SessionKeys) -> Self {
        Self::with_session(transport, Session::new(keys))
    }

    /// Create a channel around an existing session
    pub fn with_session(transport: T, session: Session) -> Self {
        Self {
            inner: Mutex::new(Inner { transport, session }),
            config: ChannelConfig::default(),
        }
    }

    /// Replace the channel configuration
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the channel configuration
    pub const fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.inner.lock().session.state()
    }

    /// Current send sequence counter
    pub fn sequence_counter(&self) -> SequenceCounter {
        self.inner.lock().session.counter()
    }

    /// Invalidate the session, e.g. after abandoning an exchange
    pub fn invalidate(&self) {
        self.inner.lock().session.invalidate();
    }

    /// Take back the transport and the session
    pub fn into_parts(self) -> (T, Session) {
        let Inner { transport, session } = self.inner.into_inner();
        (transport, session)
    }

    /// Protect `command`, exchange it with the card and return the verified response
    ///
    /// Exactly one send and one receive per call; nothing is retried. Any
    /// failure invalidates the session, and an invalidated session fails
    /// without touching the transport.
    #[instrument(level = "debug", skip_all, fields(cla = command.cla, ins = command.ins))]
    pub fn transmit(&self, command: &Command) -> Result<PlainResponse> {
        let mut guard = self.inner.lock();
        let Inner { transport, session } = &mut *guard;
        session.check_valid()?;

        if self.config.trace_plaintext {
            trace!(
                header = %hex::encode(command.header()),
                data = %hex::encode(command.payload().unwrap_or_default()),
                le = ?command.le,
                "Plain command"
            );
        }

        let wire = session.encrypt(command)?;
        let raw = wire
            .to_bytes(self.config.extended_length)
            .map_err(|error| session.fail(error))?;

        let response = match transport.transmit_raw(&raw) {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "Transport failed during secure exchange");
                return Err(session.fail(error.into()));
            }
        };

        let wire_response =
            WireResponse::from_bytes(&response).map_err(|error| session.fail(error))?;
        let plain = session.decrypt(&wire_response)?;

        if self.config.trace_plaintext {
            trace!(data = %hex::encode(&plain.data), "Plain response data");
        }
        debug!(
            status = %plain.status,
            description = plain.status.description(),
            data_len = plain.data.len(),
            "Secure exchange complete"
        );

        Ok(plain)
    }
}
