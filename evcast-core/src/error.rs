/// Evcast Error Types
///
/// Error handling shared by the codec, the emitter and the listener.

use std::io;
use thiserror::Error;

/// Main error type for evcast operations
#[derive(Error, Debug)]
pub enum EvcastError {
    /// IO error during socket operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Received bytes could not be decoded as an event
    #[error("Wire format error: {0}")]
    WireFormat(#[from] WireFormatError),

    /// A value could not be coerced to the attribute's declared type
    #[error("Type mismatch for attribute '{attribute}': expected {expected}, got {actual}")]
    TypeMismatch {
        attribute: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Attribute is not part of a validating event's template
    #[error("Unknown attribute '{attribute}' for event '{event}'")]
    UnknownAttribute { event: String, attribute: String },

    /// Encoding selector outside the supported range
    #[error("Invalid character encoding selector: {0}")]
    InvalidEncoding(i16),

    /// Event or attribute name does not fit a one-byte length prefix
    #[error("Name too long: '{name}' is {len} bytes (max: 255)")]
    NameTooLong { name: String, len: usize },

    /// String value does not fit a two-byte length prefix
    #[error("String value of attribute '{attribute}' is {len} bytes (max: 65535)")]
    StringTooLong { attribute: String, len: usize },

    /// Attribute count does not fit the two-byte count field
    #[error("Too many attributes: {0} (max: 65535)")]
    TooManyAttributes(usize),

    /// Encoded event is larger than a datagram may carry
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Buffer pool acquisition was cancelled
    #[error("No buffer available")]
    BufferUnavailable,

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias for evcast operations
pub type Result<T> = std::result::Result<T, EvcastError>;

/// Malformed datagram contents.
///
/// Fatal only to the datagram being decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireFormatError {
    #[error("Truncated datagram: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("Unknown type token: 0x{0:02x}")]
    UnknownTypeToken(u8),

    #[error("String bytes are not valid in the declared encoding")]
    InvalidString,

    #[error("Invalid character encoding selector: {0}")]
    InvalidEncoding(i16),

    #[error("Encoding attribute must be the first attribute")]
    MisplacedEncoding,

    #[error("Attribute '{attribute}' declared as {expected} but received {actual}")]
    TypeConflict {
        attribute: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{0} trailing bytes after the last attribute")]
    TrailingBytes(usize),
}

impl EvcastError {
    /// Create an invalid state error with a message
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Check if this error is recoverable
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            Self::WireFormat(_) | Self::BufferUnavailable => true,
            _ => false,
        }
    }
}

/// The error a closed datagram socket reports to pending and future receives.
#[must_use]
pub fn socket_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket closed")
}

/// Check whether an IO error is the one produced by closing our own socket.
#[must_use]
pub fn is_closed_socket(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotConnected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_errors_convert_and_are_recoverable() {
        let err: EvcastError = WireFormatError::UnknownTypeToken(0x42).into();
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "Wire format error: Unknown type token: 0x42");
    }

    #[test]
    fn closed_socket_is_recognized() {
        assert!(is_closed_socket(&socket_closed()));
        assert!(!is_closed_socket(&io::Error::from(io::ErrorKind::ConnectionReset)));
    }

    #[test]
    fn type_mismatch_display() {
        let err = EvcastError::TypeMismatch {
            attribute: "clientIP".into(),
            expected: "ip_addr",
            actual: "boolean",
        };
        assert!(err.to_string().contains("clientIP"));
        assert!(!err.is_recoverable());
    }
}
