//! RESP2 framing used between `RespClient` and a store
//!
//! Only the frame layer lives here; command semantics belong to `ops` and
//! `memory`.

mod encoder;
mod parser;

pub use encoder::{AsyncRespEncoder, encode_to_vec};
pub use parser::{AsyncRespParser, DEFAULT_MAX_FRAME_SIZE};

use std::io;

/// A single RESP2 frame
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// `+OK\r\n`
    SimpleString(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:123\r\n`
    Integer(i64),
    /// `$5\r\nhello\r\n`
    BulkString(Vec<u8>),
    /// `*2\r\n...`
    Array(Vec<RespValue>),
    /// `$-1\r\n` or `*-1\r\n`
    Null,
}

impl RespValue {
    /// Builds the request frame for a command: an array of bulk strings.
    pub fn command(name: &str, args: &[Vec<u8>]) -> Self {
        let mut items = Vec::with_capacity(args.len() + 1);
        items.push(RespValue::BulkString(name.as_bytes().to_vec()));
        items.extend(args.iter().map(|a| RespValue::BulkString(a.clone())));
        RespValue::Array(items)
    }

    /// Splits a request frame back into a command name and its arguments.
    ///
    /// Returns `None` unless the frame is a non-empty array of strings.
    pub fn into_command(self) -> Option<(String, Vec<Vec<u8>>)> {
        let RespValue::Array(items) = self else {
            return None;
        };
        let mut parts = items.into_iter().map(|item| match item {
            RespValue::BulkString(bytes) => Some(bytes),
            RespValue::SimpleString(s) => Some(s.into_bytes()),
            _ => None,
        });
        let name = String::from_utf8(parts.next()??).ok()?;
        let args = parts.collect::<Option<Vec<_>>>()?;
        Some((name, args))
    }
}

/// RESP framing errors
#[derive(Debug, thiserror::Error)]
pub enum RespError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid RESP format: {0}")]
    InvalidFormat(String),
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Integer overflow")]
    IntegerOverflow,
    #[error("Frame too large: {0} bytes (max: {1} bytes)")]
    FrameTooLarge(usize, usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_round_trips_through_into_command() {
        let frame = RespValue::command("ZADD", &[b"board".to_vec(), b"1.5".to_vec(), b"x".to_vec()]);
        let (name, args) = frame.into_command().unwrap();
        assert_eq!(name, "ZADD");
        assert_eq!(args, vec![b"board".to_vec(), b"1.5".to_vec(), b"x".to_vec()]);
    }

    #[test]
    fn test_into_command_rejects_non_arrays() {
        assert!(RespValue::Integer(1).into_command().is_none());
        assert!(RespValue::Array(vec![]).into_command().is_none());
        assert!(
            RespValue::Array(vec![RespValue::BulkString(b"GET".to_vec()), RespValue::Integer(3)])
                .into_command()
                .is_none()
        );
    }
}
