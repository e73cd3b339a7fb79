use thiserror::Error;

use crate::resp::RespError;

pub type OpsResult<T> = Result<T, OpsError>;
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by the typed operation facades
///
/// A missing key or out-of-range read is never an error; those come back as
/// `None` or an empty collection.
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The key holds a different data type. Message is the store's, verbatim.
    #[error("{0}")]
    TypeMismatch(String),

    #[error("Index {index} out of range for list {key}")]
    IndexOutOfRange { key: String, index: i64 },

    #[error("No such key: {0}")]
    NoSuchKey(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("Transport error: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for OpsError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::WrongType(msg) => OpsError::TypeMismatch(msg),
            other => OpsError::Transport(other),
        }
    }
}

/// Failures of the command-execution collaborator
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] RespError),

    /// Error reply from the store other than a type mismatch
    #[error("Server error: {0}")]
    Server(String),

    #[error("{0}")]
    WrongType(String),

    #[error("Connect timeout")]
    ConnectTimeout,

    #[error("Connection closed")]
    Closed,
}

impl TransportError {
    /// Classifies an error reply sent by the store.
    pub fn from_server_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if msg.starts_with("WRONGTYPE") {
            TransportError::WrongType(msg)
        } else {
            TransportError::Server(msg)
        }
    }
}

/// Value encoding / decoding failures
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Value is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
