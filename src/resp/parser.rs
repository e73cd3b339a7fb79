//! Async RESP2 frame reader

use super::{RespError, RespValue};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Default cap on a single frame: 512MB
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Upper bound on array length accepted from a peer
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Reads RESP frames from an async byte stream
pub struct AsyncRespParser<R: AsyncRead + Unpin> {
    reader: BufReader<R>,
    max_bytes: usize,
    bytes_read: usize,
}

impl<R: AsyncRead + Unpin> AsyncRespParser<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_bytes(reader, DEFAULT_MAX_FRAME_SIZE)
    }

    /// # Arguments
    /// * `reader` - underlying stream
    /// * `max_bytes` - largest frame accepted before failing with `FrameTooLarge`
    pub fn with_max_bytes(reader: R, max_bytes: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            max_bytes,
            bytes_read: 0,
        }
    }

    fn check_frame_size(&mut self, additional: usize) -> Result<(), RespError> {
        self.bytes_read = self.bytes_read.saturating_add(additional);
        if self.bytes_read > self.max_bytes {
            Err(RespError::FrameTooLarge(self.bytes_read, self.max_bytes))
        } else {
            Ok(())
        }
    }

    /// Reads the next complete frame.
    ///
    /// The size limit applies per frame, so a long-lived connection never
    /// trips it by accumulation.
    pub async fn read_frame(&mut self) -> Result<RespValue, RespError> {
        self.bytes_read = 0;
        self.parse().await
    }

    /// Waits until the peer sends more bytes or hangs up; `true` on hang-up.
    ///
    /// Cancel safe: buffered bytes stay available to the next `read_frame`.
    pub async fn peer_closed(&mut self) -> std::io::Result<bool> {
        Ok(self.reader.fill_buf().await?.is_empty())
    }

    async fn parse(&mut self) -> Result<RespValue, RespError> {
        let mut line = String::new();
        // one byte past the budget so an overlong line still fails the size check
        let budget = self.max_bytes.saturating_sub(self.bytes_read).saturating_add(1);
        let n = (&mut self.reader)
            .take(budget as u64)
            .read_line(&mut line)
            .await?;
        if n == 0 {
            return Err(RespError::UnexpectedEof);
        }
        self.check_frame_size(n)?;

        let line = line.trim_end_matches(['\r', '\n']);
        let mut chars = line.chars();
        let prefix = chars
            .next()
            .ok_or_else(|| RespError::InvalidFormat("Empty line".to_string()))?;
        let body = chars.as_str();

        match prefix {
            '+' => Ok(RespValue::SimpleString(body.to_string())),
            '-' => Ok(RespValue::Error(body.to_string())),
            ':' => {
                // i128 first so overflow is reported as such
                let num = body
                    .parse::<i128>()
                    .map_err(|_| RespError::InvalidFormat(format!("Invalid integer: {}", body)))?;
                i64::try_from(num)
                    .map(RespValue::Integer)
                    .map_err(|_| RespError::IntegerOverflow)
            }
            '$' => {
                let len = body.parse::<i64>().map_err(|_| {
                    RespError::InvalidFormat(format!("Invalid bulk string length: {}", body))
                })?;
                if len == -1 {
                    return Ok(RespValue::Null);
                }
                if len < 0 {
                    return Err(RespError::InvalidFormat(format!(
                        "Invalid bulk string length: {}",
                        len
                    )));
                }
                let len = len as usize;
                self.check_frame_size(len + 2)?;

                let mut buffer = vec![0u8; len];
                self.reader.read_exact(&mut buffer).await?;
                let mut crlf = [0u8; 2];
                self.reader.read_exact(&mut crlf).await?;
                if crlf != *b"\r\n" {
                    return Err(RespError::InvalidFormat(
                        "Expected \\r\\n after bulk string".to_string(),
                    ));
                }
                Ok(RespValue::BulkString(buffer))
            }
            '*' => {
                let count = body.parse::<i64>().map_err(|_| {
                    RespError::InvalidFormat(format!("Invalid array length: {}", body))
                })?;
                if count == -1 {
                    return Ok(RespValue::Null);
                }
                if count < 0 {
                    return Err(RespError::InvalidFormat(format!(
                        "Invalid array length: {}",
                        count
                    )));
                }
                let count = count as usize;
                if count > MAX_ARRAY_LEN {
                    return Err(RespError::InvalidFormat(format!(
                        "Array too large: {} elements",
                        count
                    )));
                }

                let mut array = Vec::with_capacity(count);
                for _ in 0..count {
                    array.push(Box::pin(self.parse()).await?);
                }
                Ok(RespValue::Array(array))
            }
            _ => Err(RespError::InvalidFormat(format!(
                "Unknown RESP type: {}",
                prefix
            ))),
        }
    }
}
