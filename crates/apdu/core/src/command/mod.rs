//! APDU command definitions
//!
//! This module provides the plain command APDU type according to ISO/IEC 7816-4,
//! including serialization in short and extended length form.

pub mod error;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use error::CommandError;

/// Expected response length (Le) of a command.
///
/// A value of `0` is the wildcard "as many bytes as available", encoded as `00`
/// in short form and `00 00` in extended form.
pub type ExpectedLength = u16;

/// Largest Lc that fits the short form
pub const SHORT_MAX_LC: usize = 0xFF;
/// Largest explicit Le that fits the short form
pub const SHORT_MAX_LE: ExpectedLength = 0xFF;
/// Largest Lc that fits the extended form
pub const EXTENDED_MAX_LC: usize = 0xFFFF;

/// Wildcard expected length: as many bytes as the card has available
pub const LE_WILDCARD: ExpectedLength = 0;

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: ExpectedLength) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: None,
        }
    }

    /// Create a new command with both data and expected length
    pub fn new_with_data_and_le<T: Into<Bytes>>(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: T,
        le: ExpectedLength,
    ) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: Some(le),
        }
    }

    /// The four header bytes: CLA, INS, P1, P2
    pub const fn header(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    /// Command data, treating an empty data field as absent
    pub fn payload(&self) -> Option<&[u8]> {
        self.data.as_deref().filter(|data| !data.is_empty())
    }

    /// Whether the command needs the extended length form
    pub fn is_extended(&self) -> bool {
        self.payload().is_some_and(|data| data.len() > SHORT_MAX_LC)
            || self.le.is_some_and(|le| le > SHORT_MAX_LE)
    }

    /// Check that the data field fits into an extended length command
    pub fn check_length(&self) -> Result<(), CommandError> {
        match self.payload() {
            Some(data) if data.len() > EXTENDED_MAX_LC => Err(CommandError::data_too_long(
                data.len(),
                EXTENDED_MAX_LC,
            )),
            _ => Ok(()),
        }
    }

    /// Serialize to raw APDU bytes, choosing short or extended form as needed
    pub fn to_bytes(&self) -> Bytes {
        self.encode(self.is_extended())
    }

    /// Serialize to raw APDU bytes, always in extended form
    pub fn to_extended_bytes(&self) -> Bytes {
        self.encode(true)
    }

    /// Calculate length of the serialized command
    pub fn command_length(&self, extended: bool) -> usize {
        let data_len = self.payload().map_or(0, <[u8]>::len);
        let mut length = 4;

        if data_len > 0 {
            length += data_len + if extended { 3 } else { 1 };
        }

        if self.le.is_some() {
            length += match (extended, data_len > 0) {
                (false, _) => 1,
                (true, true) => 2,
                (true, false) => 3,
            };
        }

        length
    }

    fn encode(&self, extended: bool) -> Bytes {
        debug_assert!(self.check_length().is_ok());

        let mut buffer = BytesMut::with_capacity(self.command_length(extended));
        buffer.put_slice(&self.header());

        let payload = self.payload();
        if let Some(data) = payload {
            if extended {
                buffer.put_u8(0x00);
                buffer.put_u16(data.len() as u16);
            } else {
                buffer.put_u8(data.len() as u8);
            }
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            if extended {
                if payload.is_none() {
                    buffer.put_u8(0x00);
                }
                buffer.put_u16(le);
            } else {
                buffer.put_u8(le as u8);
            }
        }

        buffer.freeze()
    }

    /// Parse a command from raw bytes in short or extended form
    pub fn from_bytes(data: &[u8]) -> Result<Self, CommandError> {
        if data.len() < 4 {
            return Err(CommandError::InvalidLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);
        let body = &data[4..];

        match body {
            [] => {}
            [le] => command.le = Some(ExpectedLength::from(*le)),
            [0x00, rest @ ..] if rest.len() >= 2 => {
                let first = u16::from_be_bytes([rest[0], rest[1]]);
                let rest = &rest[2..];
                if rest.is_empty() {
                    command.le = Some(first);
                } else {
                    let lc = usize::from(first);
                    if lc == 0 {
                        return Err(CommandError::parse("extended Lc of zero"));
                    }
                    if rest.len() == lc {
                        command.data = Some(Bytes::copy_from_slice(rest));
                    } else if rest.len() == lc + 2 {
                        command.data = Some(Bytes::copy_from_slice(&rest[..lc]));
                        command.le = Some(u16::from_be_bytes([rest[lc], rest[lc + 1]]));
                    } else {
                        return Err(CommandError::InvalidLength(data.len()));
                    }
                }
            }
            [lc, rest @ ..] => {
                let lc = usize::from(*lc);
                if lc == 0 {
                    return Err(CommandError::InvalidFormat);
                }
                if rest.len() == lc {
                    command.data = Some(Bytes::copy_from_slice(rest));
                } else if rest.len() == lc + 1 {
                    command.data = Some(Bytes::copy_from_slice(&rest[..lc]));
                    command.le = Some(ExpectedLength::from(rest[lc]));
                } else {
                    return Err(CommandError::InvalidLength(data.len()));
                }
            }
        }

        trace!(
            cla = format_args!("{:#04x}", command.cla),
            ins = format_args!("{:#04x}", command.ins),
            data_len = command.payload().map_or(0, <[u8]>::len),
            le = ?command.le,
            "Parsed APDU command"
        );

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_command_serialization() {
        let data = Bytes::from_static(&[0xD2, 0x76, 0x00, 0x01, 0x44, 0x80, 0x00]);
        let cmd = Command::new_with_data_and_le(0x00, 0xA4, 0x04, 0x00, data, LE_WILDCARD);
        let bytes = cmd.to_bytes();

        assert_eq!(bytes.as_ref(), &hex!("00A4040007D2760001448000 00"));
        assert!(!cmd.is_extended());
    }

    #[test]
    fn test_command_length() {
        let cmd1 = Command::new(0x00, 0xB0, 0x00, 0x00);
        assert_eq!(cmd1.command_length(false), 4);

        let cmd2 = Command::new_with_le(0x00, 0xB0, 0x00, 0x00, 0xFF);
        assert_eq!(cmd2.command_length(false), 5);
        assert_eq!(cmd2.command_length(true), 7);

        let data = Bytes::from_static(&[0x01, 0x02, 0x03]);
        let cmd3 = Command::new_with_data(0x00, 0xD6, 0x00, 0x00, data.clone());
        assert_eq!(cmd3.command_length(false), 8);

        let cmd4 = Command::new_with_data_and_le(0x00, 0xD6, 0x00, 0x00, data, 0xFF);
        assert_eq!(cmd4.command_length(false), 9);
        assert_eq!(cmd4.command_length(true), 12);
        assert_eq!(cmd4.to_extended_bytes().len(), 12);
    }

    #[test]
    fn test_extended_serialization() {
        let cmd = Command::new_with_le(0x00, 0xB0, 0x81, 0x00, 0x0100);
        assert!(cmd.is_extended());
        assert_eq!(cmd.to_bytes().as_ref(), &hex!("00B08100000100"));

        let cmd = Command::new_with_data(0x00, 0xD6, 0x00, 0x00, vec![0xAB; 300]);
        let bytes = cmd.to_bytes();
        assert_eq!(&bytes[..7], &hex!("00D6000000012C"));
        assert_eq!(bytes.len(), 7 + 300);
    }

    #[test]
    fn test_check_length() {
        let cmd = Command::new_with_data(0x00, 0xD6, 0x00, 0x00, vec![0u8; 0x1_0000]);
        assert!(matches!(
            cmd.check_length(),
            Err(CommandError::DataTooLong(0x1_0000, EXTENDED_MAX_LC))
        ));
    }

    #[test]
    fn test_command_from_bytes() {
        // Case 1
        let cmd = Command::from_bytes(&hex!("00A4040C")).unwrap();
        assert_eq!(cmd, Command::new(0x00, 0xA4, 0x04, 0x0C));

        // Case 2 short with wildcard Le
        let cmd = Command::from_bytes(&hex!("00B0810000")).unwrap();
        assert_eq!(cmd.le, Some(LE_WILDCARD));
        assert!(cmd.data.is_none());

        // Case 3 short
        let cmd = Command::from_bytes(&hex!("00A4040C03010203")).unwrap();
        assert_eq!(cmd.payload(), Some(&hex!("010203")[..]));
        assert!(cmd.le.is_none());

        // Case 4 short
        let cmd = Command::from_bytes(&hex!("00A4040003010203FF")).unwrap();
        assert_eq!(cmd.payload(), Some(&hex!("010203")[..]));
        assert_eq!(cmd.le, Some(0xFF));

        // Case 2 extended
        let cmd = Command::from_bytes(&hex!("00B08100000100")).unwrap();
        assert_eq!(cmd.le, Some(0x0100));

        // Case 4 extended
        let cmd = Command::from_bytes(&hex!("00D60000000002ABCD0000")).unwrap();
        assert_eq!(cmd.payload(), Some(&hex!("ABCD")[..]));
        assert_eq!(cmd.le, Some(LE_WILDCARD));

        // Inconsistent Lc
        assert!(Command::from_bytes(&hex!("00A4040C0501")).is_err());
        assert!(Command::from_bytes(&hex!("00A404")).is_err());
    }
}
