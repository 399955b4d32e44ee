//! Status word definitions for APDU responses

use std::fmt;

/// Status Word (SW1-SW2) from an APDU response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Status bytes in wire order
    pub const fn to_bytes(&self) -> [u8; 2] {
        [self.sw1, self.sw2]
    }

    /// Check if this status word indicates success (90 00)
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Check if the card rejected the secure messaging layer itself (69 87 / 69 88)
    pub const fn is_secure_messaging_error(&self) -> bool {
        self.sw1 == 0x69 && (self.sw2 == 0x87 || self.sw2 == 0x88)
    }

    /// Get a description of this status word
    pub const fn description(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "Success",
            (0x61, _) => "More data available",
            (0x62, 0x81) => "Part of returned data may be corrupted",
            (0x62, 0x82) => "End of file/record reached before reading Le bytes",
            (0x62, 0x83) => "Selected file deactivated",
            (0x63, n) if (n & 0xF0) == 0xC0 => "Counter value",
            (0x64, 0x00) => "State of non-volatile memory unchanged",
            (0x65, 0x81) => "Memory failure",
            (0x67, 0x00) => "Wrong length",
            (0x68, 0x82) => "Secure messaging not supported",
            (0x69, 0x82) => "Security status not satisfied",
            (0x69, 0x83) => "Authentication method blocked",
            (0x69, 0x85) => "Conditions of use not satisfied",
            (0x69, 0x86) => "Command not allowed",
            (0x69, 0x87) => "Expected SM data objects missing",
            (0x69, 0x88) => "SM data objects incorrect",
            (0x6A, 0x80) => "Incorrect parameters in the data field",
            (0x6A, 0x82) => "File not found",
            (0x6A, 0x86) => "Incorrect parameters P1-P2",
            (0x6A, 0x88) => "Referenced data not found",
            (0x6B, 0x00) => "Wrong parameters P1-P2",
            (0x6C, _) => "Wrong Le field",
            (0x6D, 0x00) => "Instruction code not supported or invalid",
            (0x6E, 0x00) => "Class not supported",
            (0x6F, 0x00) => "No precise diagnosis",
            _ => "Unknown status word",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from(tuple: (u8, u8)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X}", self.sw1, self.sw2)
    }
}

/// Common status words
pub mod common {
    use super::StatusWord;

    /// Success (90 00)
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);

    /// Expected secure messaging data objects missing (69 87)
    pub const SM_OBJECTS_MISSING: StatusWord = StatusWord::new(0x69, 0x87);

    /// Secure messaging data objects incorrect (69 88)
    pub const SM_OBJECTS_INCORRECT: StatusWord = StatusWord::new(0x69, 0x88);
}
