//! `CommandExecutor` over a TCP connection speaking RESP2

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::{Command, CommandExecutor, Reply};
use crate::error::{TransportError, TransportResult};
use crate::resp::{AsyncRespEncoder, AsyncRespParser, RespError};

/// One request/response stream
struct Connection {
    parser: AsyncRespParser<OwnedReadHalf>,
    encoder: AsyncRespEncoder<OwnedWriteHalf>,
}

impl Connection {
    async fn open(config: &ClientConfig) -> TransportResult<Self> {
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&config.addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout)??;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        debug!("Opened connection to {}", config.addr);
        Ok(Self {
            parser: AsyncRespParser::with_max_bytes(reader, config.max_frame_size),
            encoder: AsyncRespEncoder::new(writer),
        })
    }

    async fn request(&mut self, cmd: &Command) -> TransportResult<Reply> {
        self.encoder.write_frame(&cmd.to_resp()).await?;
        let frame = self.parser.read_frame().await.map_err(|e| match e {
            RespError::UnexpectedEof => TransportError::Closed,
            other => TransportError::Protocol(other),
        })?;
        Reply::from_resp(frame)
    }
}

/// Whether the stream is left in an unknown state after this failure
fn breaks_connection(err: &TransportError) -> bool {
    matches!(
        err,
        TransportError::Io(_) | TransportError::Protocol(_) | TransportError::Closed
    )
}

/// RESP2 client
///
/// Ordinary commands share one connection, serialized by a mutex. The
/// connection is taken out of its slot for the duration of a request, so a
/// request cancelled halfway drops the connection instead of leaving an
/// unread reply behind; the next call opens a fresh one. Blocking commands
/// each open their own connection, closed as soon as the call returns or is
/// cancelled.
pub struct RespClient {
    config: ClientConfig,
    shared: Mutex<Option<Connection>>,
    closed: AtomicBool,
}

impl RespClient {
    /// Connects eagerly so a bad address fails at startup.
    pub async fn connect(config: ClientConfig) -> TransportResult<Self> {
        let conn = Connection::open(&config).await?;
        info!("Connected to store at {}", config.addr);
        Ok(Self {
            config,
            shared: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Drops the shared connection; later calls fail with `Closed`.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shared.lock().await.take();
        info!("Closed client for {}", self.config.addr);
    }

    fn check_open(&self) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CommandExecutor for RespClient {
    async fn execute(&self, cmd: Command) -> TransportResult<Reply> {
        self.check_open()?;
        debug!("-> {:?}", cmd);
        let mut slot = self.shared.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => Connection::open(&self.config).await?,
        };
        let result = conn.request(&cmd).await;
        match &result {
            Err(e) if breaks_connection(e) => {
                warn!("Dropping connection to {} after {}: {}", self.config.addr, cmd.name(), e);
            }
            _ => *slot = Some(conn),
        }
        result
    }

    async fn execute_blocking(&self, cmd: Command) -> TransportResult<Reply> {
        self.check_open()?;
        debug!("-> {:?} (dedicated connection)", cmd);
        let mut conn = Connection::open(&self.config).await?;
        conn.request(&cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig::new(addr.to_string()).with_connect_timeout(Duration::from_secs(2));
        let err = RespClient::connect(config).await.err().unwrap();
        assert!(matches!(
            err,
            TransportError::Io(_) | TransportError::ConnectTimeout
        ));
    }

    #[test]
    fn test_server_errors_keep_the_connection() {
        assert!(!breaks_connection(&TransportError::Server("ERR syntax error".into())));
        assert!(!breaks_connection(&TransportError::WrongType("WRONGTYPE".into())));
        assert!(breaks_connection(&TransportError::Closed));
    }
}
