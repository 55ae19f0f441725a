//! Error types for the S7 protocol client.

use thiserror::Error;

use crate::types::ReturnCode;

/// Result type alias for S7 operations.
pub type Result<T> = std::result::Result<T, S7Error>;

/// S7 protocol error types.
#[derive(Debug, Error)]
pub enum S7Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// No negotiated session
    #[error("Not connected")]
    NotConnected,

    /// A session already exists for this client
    #[error("Already connected")]
    AlreadyConnected,

    /// TCP connect did not complete in time
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// The controller did not answer a request in time
    #[error("Response timeout")]
    ResponseTimeout,

    /// The exchange was interrupted by a disconnect
    #[error("Exchange aborted by disconnect")]
    Aborted,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TPKT framing is broken; the byte stream can no longer be trusted
    #[error("Framing error: {0}")]
    Framing(String),

    /// Transport-connection or communication setup failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Response too short or inconsistent with its own length fields
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Error class/code reported in the application header
    #[error("PLC reported {}: error class 0x{class:02X}, code 0x{code:02X}", describe_class(.class))]
    Header {
        /// Error class
        class: u8,
        /// Error code
        code: u8,
    },

    /// Per-item return code other than success
    #[error("Item error: {0}")]
    Item(ReturnCode),

    /// A chunk returned fewer bytes than requested
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Buffer access outside its bounds
    #[error("Out of range: {len} bytes at offset {offset} exceed buffer of {available}")]
    OutOfRange {
        offset: usize,
        len: usize,
        available: usize,
    },

    /// Bit index outside 0..=7
    #[error("Invalid bit index: {0}")]
    InvalidBit(u8),

    /// Byte is not a valid BCD pair
    #[error("Invalid BCD byte: 0x{0:02X}")]
    InvalidBcd(u8),

    /// Date-time fields out of range
    #[error("Invalid date-time: {0}")]
    InvalidDateTime(String),
}

impl S7Error {
    /// Create a handshake error with a message.
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    /// Create an invalid frame error.
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if this error leaves the connection unusable.
    ///
    /// The client drops its session after any of these; a fresh
    /// `connect` is required.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::NotConnected
                | Self::ConnectionTimeout
                | Self::ResponseTimeout
                | Self::Aborted
                | Self::Io(_)
                | Self::Framing(_)
        )
    }

    /// Check if this error is a per-item return code from the PLC.
    pub fn is_item_error(&self) -> bool {
        matches!(self, Self::Item(_))
    }

    /// The item return code, if this is an item error.
    pub fn return_code(&self) -> Option<ReturnCode> {
        match self {
            Self::Item(code) => Some(*code),
            _ => None,
        }
    }
}

/// Describe an application header error class.
pub fn error_class_name(class: u8) -> &'static str {
    match class {
        0x00 => "no error",
        0x81 => "application relationship error",
        0x82 => "object definition error",
        0x83 => "no resources available",
        0x84 => "error on service processing",
        0x85 => "error on supplies",
        0x87 => "access error",
        _ => "unknown error class",
    }
}

fn describe_class(class: &u8) -> &'static str {
    error_class_name(*class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = S7Error::NotConnected;
        assert_eq!(err.to_string(), "Not connected");

        let err = S7Error::Item(ReturnCode::AccessDenied);
        assert_eq!(err.to_string(), "Item error: access denied (0x05)");

        let err = S7Error::Header {
            class: 0x85,
            code: 0x00,
        };
        assert_eq!(
            err.to_string(),
            "PLC reported error on supplies: error class 0x85, code 0x00"
        );

        let err = S7Error::OutOfRange {
            offset: 3,
            len: 4,
            available: 6,
        };
        assert_eq!(
            err.to_string(),
            "Out of range: 4 bytes at offset 3 exceed buffer of 6"
        );
    }

    #[test]
    fn test_is_connection_error() {
        assert!(S7Error::NotConnected.is_connection_error());
        assert!(S7Error::ResponseTimeout.is_connection_error());
        assert!(S7Error::Aborted.is_connection_error());
        assert!(S7Error::Framing("bad version".into()).is_connection_error());
        assert!(!S7Error::Item(ReturnCode::ObjectNotFound).is_connection_error());
        assert!(!S7Error::invalid_frame("short").is_connection_error());
        assert!(!S7Error::Header { class: 0x81, code: 0x04 }.is_connection_error());
    }

    #[test]
    fn test_return_code_accessor() {
        let err = S7Error::Item(ReturnCode::Unavailable);
        assert!(err.is_item_error());
        assert_eq!(err.return_code(), Some(ReturnCode::Unavailable));
        assert_eq!(S7Error::NotConnected.return_code(), None);
    }
}
