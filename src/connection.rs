//! Narrow command boundary between the facades and whatever executes commands
//!
//! The facades only ever build a `Command` and interpret a `Reply`. Anything
//! implementing `CommandExecutor` (a TCP client, the in-process
//! `MemoryStore`, a test double) can sit underneath.

use std::fmt;

use async_trait::async_trait;

use crate::error::{OpsError, OpsResult, TransportError, TransportResult};
use crate::resp::RespValue;

/// One store command: a name plus ordered binary arguments
#[derive(Clone, PartialEq)]
pub struct Command {
    name: &'static str,
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl ToArg) -> Self {
        self.args.push(arg.to_arg());
        self
    }

    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        self.args.extend(args.into_iter().map(|a| a.to_arg()));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.args
    }

    pub fn into_parts(self) -> (&'static str, Vec<Vec<u8>>) {
        (self.name, self.args)
    }

    pub fn to_resp(&self) -> RespValue {
        RespValue::command(self.name, &self.args)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

/// Conversion of a Rust value into one wire argument
pub trait ToArg {
    fn to_arg(&self) -> Vec<u8>;
}

impl ToArg for str {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Vec<u8> {
        self.clone()
    }
}

impl ToArg for i64 {
    fn to_arg(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl ToArg for u64 {
    fn to_arg(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl ToArg for usize {
    fn to_arg(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl ToArg for f64 {
    fn to_arg(&self) -> Vec<u8> {
        format_score(*self).into_bytes()
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Vec<u8> {
        (**self).to_arg()
    }
}

/// Formats a float the way the store parses it back (`inf`, `-inf`, shortest decimal).
pub fn format_score(v: f64) -> String {
    if v == f64::INFINITY {
        "+inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        v.to_string()
    }
}

/// Typed reply from the store
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Status(String),
    Int(i64),
    Double(f64),
    Bulk(Vec<u8>),
    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Self {
        Reply::Bulk(bytes.into())
    }

    pub fn from_bool(b: bool) -> Self {
        Reply::Int(b as i64)
    }

    /// Converts a wire frame, turning error frames into `TransportError`.
    pub fn from_resp(value: RespValue) -> TransportResult<Reply> {
        Ok(match value {
            RespValue::SimpleString(s) => Reply::Status(s),
            RespValue::Error(msg) => return Err(TransportError::from_server_message(msg)),
            RespValue::Integer(i) => Reply::Int(i),
            RespValue::BulkString(b) => Reply::Bulk(b),
            RespValue::Null => Reply::Nil,
            RespValue::Array(items) => Reply::Array(
                items
                    .into_iter()
                    .map(Reply::from_resp)
                    .collect::<TransportResult<_>>()?,
            ),
        })
    }

    /// RESP2 has no double type; doubles travel as bulk strings.
    pub fn into_resp(self) -> RespValue {
        match self {
            Reply::Nil => RespValue::Null,
            Reply::Status(s) => RespValue::SimpleString(s),
            Reply::Int(i) => RespValue::Integer(i),
            Reply::Double(d) => RespValue::BulkString(format_score(d).into_bytes()),
            Reply::Bulk(b) => RespValue::BulkString(b),
            Reply::Array(items) => {
                RespValue::Array(items.into_iter().map(Reply::into_resp).collect())
            }
        }
    }

    fn unexpected(&self, wanted: &str) -> OpsError {
        OpsError::UnexpectedReply(format!("expected {}, got {:?}", wanted, self))
    }

    pub fn expect_ok(self) -> OpsResult<()> {
        match self {
            Reply::Status(_) => Ok(()),
            other => Err(other.unexpected("status")),
        }
    }

    pub fn into_int(self) -> OpsResult<i64> {
        match self {
            Reply::Int(i) => Ok(i),
            other => Err(other.unexpected("integer")),
        }
    }

    /// Counts and lengths; a negative integer is a protocol violation.
    pub fn into_count(self) -> OpsResult<u64> {
        let i = self.into_int()?;
        u64::try_from(i).map_err(|_| OpsError::UnexpectedReply(format!("negative count {}", i)))
    }

    pub fn into_bool(self) -> OpsResult<bool> {
        Ok(self.into_int()? != 0)
    }

    pub fn into_opt_int(self) -> OpsResult<Option<i64>> {
        match self {
            Reply::Nil => Ok(None),
            other => other.into_int().map(Some),
        }
    }

    pub fn into_f64(self) -> OpsResult<f64> {
        match self {
            Reply::Double(d) => Ok(d),
            Reply::Int(i) => Ok(i as f64),
            Reply::Bulk(ref b) => std::str::from_utf8(b)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| self.unexpected("float")),
            other => Err(other.unexpected("float")),
        }
    }

    pub fn into_opt_f64(self) -> OpsResult<Option<f64>> {
        match self {
            Reply::Nil => Ok(None),
            other => other.into_f64().map(Some),
        }
    }

    pub fn into_opt_bytes(self) -> OpsResult<Option<Vec<u8>>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Bulk(b) => Ok(Some(b)),
            Reply::Status(s) => Ok(Some(s.into_bytes())),
            other => Err(other.unexpected("bulk string")),
        }
    }

    pub fn into_opt_string(self) -> OpsResult<Option<String>> {
        self.into_opt_bytes()?.map(bytes_to_string).transpose()
    }

    pub fn into_string(self) -> OpsResult<String> {
        self.into_opt_string()?
            .ok_or_else(|| OpsError::UnexpectedReply("expected bulk string, got nil".to_string()))
    }

    /// `Nil` reads as an empty array, matching missing-key semantics.
    pub fn into_array(self) -> OpsResult<Vec<Reply>> {
        match self {
            Reply::Nil => Ok(Vec::new()),
            Reply::Array(items) => Ok(items),
            other => Err(other.unexpected("array")),
        }
    }

    pub fn into_strings(self) -> OpsResult<Vec<String>> {
        self.into_array()?.into_iter().map(Reply::into_string).collect()
    }

    pub fn into_opt_strings(self) -> OpsResult<Vec<Option<String>>> {
        self.into_array()?
            .into_iter()
            .map(Reply::into_opt_string)
            .collect()
    }

    pub fn into_opt_bytes_vec(self) -> OpsResult<Vec<Option<Vec<u8>>>> {
        self.into_array()?
            .into_iter()
            .map(Reply::into_opt_bytes)
            .collect()
    }
}

pub(crate) fn bytes_to_string(bytes: Vec<u8>) -> OpsResult<String> {
    String::from_utf8(bytes)
        .map_err(|e| OpsError::UnexpectedReply(format!("non UTF-8 string: {}", e)))
}

/// Executes one command against the store
///
/// Implementations own connection management; callers never retry through
/// this trait.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, cmd: Command) -> TransportResult<Reply>;

    /// Commands that may park server-side (BLPOP and friends).
    ///
    /// Implementations sharing a connection between callers should give each
    /// blocking call its own logical request so other callers keep running.
    async fn execute_blocking(&self, cmd: Command) -> TransportResult<Reply> {
        self.execute(cmd).await
    }
}
