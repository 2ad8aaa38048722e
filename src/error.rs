//! # Error Types
//!
//! Error handling for the message bus client.
//!
//! Every fault the client can hit is a variant of [`ProtocolError`], from raw
//! socket failures up to errors raised inside application callbacks.
//!
//! ## Error Categories
//! - **Transport faults**: I/O errors and peer disconnects
//! - **Decode faults**: truncated frames, bad length prefixes, unknown discriminants
//! - **Protocol-logic faults**: messages a client must never receive
//! - **Encode errors**: outbound frames holding empty collections
//! - **Handler faults**: errors returned by application callbacks
//! - **Setup errors**: TLS, configuration and handshake problems
//!
//! A running connection surfaces all of these the same way: a faulted close.
//! The variants exist so logs and direct callers can tell them apart.
//!
//! ## Example Usage
//! ```rust
//! use messagebus_client::error::{ProtocolError, Result};
//!
//! fn check_port(port: u16) -> Result<u16> {
//!     if port == 0 {
//!         return Err(ProtocolError::ConfigError("port must be non-zero".into()));
//!     }
//!     Ok(port)
//! }
//!
//! assert!(check_port(0).is_err());
//! ```

use std::io;
use thiserror::Error;

use crate::protocol::message::MessageType;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Handshake errors
    pub const ERR_EMPTY_CREDENTIAL: &str = "Credential value cannot be empty";

    /// TLS errors
    pub const ERR_INVALID_SERVER_NAME: &str = "Invalid server name";
}

/// ProtocolError is the primary error type for all client operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Truncated frame: stream ended after {0} buffered bytes")]
    Truncated(usize),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Invalid length prefix: {0}")]
    InvalidLength(i32),

    #[error("Field too large: {0} bytes")]
    OversizedField(usize),

    #[error("String field is not valid UTF-8")]
    InvalidUtf8,

    #[error("Empty collection in {0}: send it as absent")]
    NotNormalized(MessageType),

    #[error("Unexpected message type for a client: {0}")]
    UnexpectedMessage(MessageType),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TLS error: {0}")]
    TlsError(String),
}

impl ProtocolError {
    /// True for faults caused by malformed or unexpected inbound bytes.
    pub fn is_decode_fault(&self) -> bool {
        matches!(
            self,
            ProtocolError::Truncated(_)
                | ProtocolError::UnknownMessageType(_)
                | ProtocolError::InvalidLength(_)
                | ProtocolError::OversizedField(_)
                | ProtocolError::InvalidUtf8
        )
    }

    /// Wrap any displayable error raised inside an application callback.
    pub fn handler<E: std::fmt::Display>(err: E) -> Self {
        ProtocolError::Handler(err.to_string())
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
