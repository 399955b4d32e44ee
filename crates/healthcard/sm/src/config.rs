//! Configuration options for a secure channel

/// Configuration options for a secure channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Allow extended length wire commands
    ///
    /// When disabled, a command whose protected form needs extended length
    /// fails with an encoding error instead of being sent.
    pub extended_length: bool,

    /// Trace plaintext command and response bytes
    pub trace_plaintext: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelConfig {
    /// Create a new default configuration
    pub const fn new() -> Self {
        Self {
            extended_length: true,
            trace_plaintext: false,
        }
    }

    /// Set whether extended length wire commands are allowed
    pub const fn with_extended_length(mut self, extended_length: bool) -> Self {
        self.extended_length = extended_length;
        self
    }

    /// Set whether plaintext is traced
    pub const fn with_trace_plaintext(mut self, trace_plaintext: bool) -> Self {
        self.trace_plaintext = trace_plaintext;
        self
    }
}
