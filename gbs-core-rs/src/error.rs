//! Error types for the station and drone sides

use crate::protocol::Message;
use thiserror::Error;

/// A frame payload that does not belong to the control vocabulary
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("message is not valid UTF-8")]
    NotUtf8,

    #[error("unrecognized message: {0:?}")]
    Unrecognized(String),

    #[error("invalid {field} in message: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Failure on a framed control connection
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection closed by peer")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(Message),
}

impl ChannelError {
    /// Whether the connection is unusable after this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChannelError::Protocol(_) | ChannelError::UnexpectedReply(_))
    }
}

/// Registration handshake failure. The drone is never registered.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("connection closed before registration")]
    Closed,

    #[error("failed to read registration: {0}")]
    Read(#[source] ChannelError),

    #[error("timed out waiting for registration")]
    Timeout,

    #[error("registration payload is not an integer: {0:?}")]
    InvalidFitness(String),

    #[error("failed to deliver identity {id}: {source}")]
    IdDelivery {
        id: crate::types::NodeId,
        #[source]
        source: ChannelError,
    },
}

/// Configuration loading failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
