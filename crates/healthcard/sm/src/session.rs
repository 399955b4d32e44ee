//! Session state for secure messaging
//!
//! A session owns the keys and the send sequence counter produced by PACE.
//! Any failure invalidates it for good; a new key agreement is the only way
//! back.

use healthcard_apdu_core::Command;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::counter::SequenceCounter;
use crate::engine::{self, PlainResponse, WireCommand, WireResponse};
use crate::keys::SessionKeys;
use crate::{Error, Result};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SessionState {
    /// Keys installed, nothing protected yet
    #[display("established")]
    Established,
    /// At least one command protected
    #[display("active")]
    Active,
    /// A failure occurred; terminal
    #[display("invalidated")]
    Invalidated,
}

/// Session containing keys, counter and state
#[derive(Debug)]
pub struct Session {
    /// Session keys from PACE
    keys: SessionKeys,
    /// Send sequence counter
    counter: SequenceCounter,
    /// Lifecycle state
    state: SessionState,
}

impl Session {
    /// Create a session with the counter at zero
    pub fn new(keys: SessionKeys) -> Self {
        Self::with_counter(keys, SequenceCounter::new())
    }

    /// Create a session with an explicit starting counter
    pub fn with_counter(keys: SessionKeys, counter: SequenceCounter) -> Self {
        debug!(ssc = %counter, "Secure messaging session established");
        Self {
            keys,
            counter,
            state: SessionState::Established,
        }
    }

    /// Current state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Copy of the current counter value
    pub const fn counter(&self) -> SequenceCounter {
        self.counter
    }

    /// Whether the session can still be used
    pub const fn is_valid(&self) -> bool {
        !matches!(self.state, SessionState::Invalidated)
    }

    /// Fail fast if the session has been invalidated
    pub fn check_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::SessionInvalid)
        }
    }

    /// Protect a plain command
    pub fn encrypt(&mut self, command: &Command) -> Result<WireCommand> {
        self.check_valid()?;
        match engine::encrypt(command, &self.keys, &mut self.counter) {
            Ok(wire) => {
                self.activate();
                Ok(wire)
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Verify and decrypt a protected response
    pub fn decrypt(&mut self, response: &WireResponse) -> Result<PlainResponse> {
        self.check_valid()?;
        let plain = engine::decrypt(response, &self.keys, &mut self.counter)
            .map_err(|error| self.fail(error))?;
        self.activate();
        Ok(plain)
    }

    fn activate(&mut self) {
        if self.state == SessionState::Established {
            debug!("Secure messaging session active");
            self.state = SessionState::Active;
        }
    }

    /// Invalidate the session and wipe its keys
    pub fn invalidate(&mut self) {
        if self.state != SessionState::Invalidated {
            warn!(ssc = %self.counter, "Invalidating secure messaging session");
            self.state = SessionState::Invalidated;
            self.keys.zeroize();
        }
    }

    /// Invalidate after `error` and hand it back
    pub(crate) fn fail(&mut self, error: Error) -> Error {
        warn!(error = %error, "Secure messaging failure");
        self.invalidate();
        error
    }
}
