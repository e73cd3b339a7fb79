//! Async RESP2 frame writer

use super::RespValue;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Writes RESP frames to an async byte stream
pub struct AsyncRespEncoder<W: AsyncWrite + Unpin> {
    writer: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> AsyncRespEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Writes one frame and flushes it.
    pub async fn write_frame(&mut self, value: &RespValue) -> std::io::Result<()> {
        self.writer.write_all(&encode_to_vec(value)).await?;
        self.writer.flush().await
    }
}

fn encode_into(buf: &mut Vec<u8>, value: &RespValue) {
    match value {
        RespValue::SimpleString(s) => {
            buf.push(b'+');
            buf.extend_from_slice(s.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        RespValue::Error(e) => {
            buf.push(b'-');
            buf.extend_from_slice(e.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        RespValue::Integer(i) => {
            buf.extend_from_slice(format!(":{}\r\n", i).as_bytes());
        }
        RespValue::BulkString(bytes) => {
            buf.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
            buf.extend_from_slice(bytes);
            buf.extend_from_slice(b"\r\n");
        }
        RespValue::Null => buf.extend_from_slice(b"$-1\r\n"),
        RespValue::Array(items) => {
            buf.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_into(buf, item);
            }
        }
    }
}

/// Encodes a frame into a fresh buffer.
pub fn encode_to_vec(value: &RespValue) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(&mut buf, value);
    buf
}
