//! Transport traits for APDU communication with cards
//!
//! A transport is the raw duplex byte link to the card (contactless reader,
//! simulator, test rig). It has no knowledge of command structure or of the
//! secure messaging layered on top.

pub mod error;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Trait for basic card transports
pub trait CardTransport: Send + fmt::Debug {
    /// Send one raw command APDU to the card
    fn send(&mut self, command: &[u8]) -> Result<(), TransportError>;

    /// Receive the raw response APDU (body and status word) for the last command
    fn receive(&mut self) -> Result<Bytes, TransportError>;

    /// Send raw APDU bytes to card and return response bytes
    ///
    /// Exactly one `send` followed by one `receive`; no retries.
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "Transmitting raw command");
        let result = self.send(command).and_then(|()| self.receive());
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Check if the transport is connected to a physical card
    fn is_connected(&self) -> bool;

    /// Reset the transport connection
    fn reset(&mut self) -> Result<(), TransportError>;
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    fn send(&mut self, command: &[u8]) -> Result<(), TransportError> {
        (**self).send(command)
    }

    fn receive(&mut self) -> Result<Bytes, TransportError> {
        (**self).receive()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        (**self).reset()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug, Default)]
    struct MockTransport {
        responses: VecDeque<Bytes>,
        commands: Vec<Bytes>,
        connected: bool,
    }

    impl CardTransport for MockTransport {
        fn send(&mut self, command: &[u8]) -> Result<(), TransportError> {
            if !self.connected {
                return Err(TransportError::Connection);
            }
            self.commands.push(Bytes::copy_from_slice(command));
            Ok(())
        }

        fn receive(&mut self) -> Result<Bytes, TransportError> {
            self.responses.pop_front().ok_or(TransportError::Timeout)
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn reset(&mut self) -> Result<(), TransportError> {
            self.connected = true;
            self.commands.clear();
            Ok(())
        }
    }

    #[test]
    fn test_transmit_raw_sends_then_receives() {
        let mut transport = MockTransport {
            responses: VecDeque::from([Bytes::from_static(&[0x90, 0x00])]),
            connected: true,
            ..Default::default()
        };

        let response = transport.transmit_raw(&[0x00, 0xA4, 0x04, 0x0C]).unwrap();
        assert_eq!(response.as_ref(), &[0x90, 0x00]);
        assert_eq!(transport.commands.len(), 1);

        // No queued response left: the receive fails and nothing is retried
        let err = transport.transmit_raw(&[0x00, 0xB0, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
        assert_eq!(transport.commands.len(), 2);
    }

    #[test]
    fn test_disconnected_transport() {
        let mut transport: Box<dyn CardTransport> = Box::new(MockTransport::default());
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.transmit_raw(&[0x00]),
            Err(TransportError::Connection)
        ));
        transport.reset().unwrap();
        assert!(transport.is_connected());
    }
}
