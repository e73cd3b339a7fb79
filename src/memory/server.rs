//! RESP server in front of a `MemoryStore`
//!
//! Accepts client connections and runs each request through the store

use std::io;
use std::net::SocketAddr;

use tokio::io::split;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::MemoryStore;
use crate::resp::{AsyncRespEncoder, AsyncRespParser, RespError, RespValue};

/// RESP server bound to a local address
pub struct MemoryServer {
    store: MemoryStore,
    listener: TcpListener,
    addr: SocketAddr,
}

impl MemoryServer {
    /// Binds the listener; port 0 picks an ephemeral port.
    pub async fn bind(store: MemoryStore, addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        Ok(Self {
            store,
            listener,
            addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accept loop; runs until the task is dropped.
    pub async fn serve(self) {
        info!("Memory store listening on {}", self.addr);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("New client connection from {}", peer);
                    let store = self.store.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, store).await {
                            warn!("Error handling client {}: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Runs `serve` on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.serve())
    }
}

async fn handle_client(stream: TcpStream, store: MemoryStore) -> io::Result<()> {
    let (reader, writer) = split(stream);
    let mut parser = AsyncRespParser::new(reader);
    let mut encoder = AsyncRespEncoder::new(writer);

    loop {
        let frame = match parser.read_frame().await {
            Ok(v) => v,
            Err(RespError::UnexpectedEof) => break,
            Err(e) => {
                let error = RespValue::Error(format!("ERR Protocol error: {}", e));
                encoder.write_frame(&error).await?;
                break;
            }
        };

        let Some((name, args)) = frame.into_command() else {
            let error = RespValue::Error("ERR invalid command format".to_string());
            encoder.write_frame(&error).await?;
            continue;
        };

        let run = store.run(&name, &args);
        tokio::pin!(run);
        let result = tokio::select! {
            biased;
            result = &mut run => result,
            closed = parser.peer_closed() => {
                // a client that hangs up mid-wait must not consume an element
                if closed.unwrap_or(true) {
                    debug!("Client left while {} was pending", name);
                    return Ok(());
                }
                run.await
            }
        };

        let response = match result {
            Ok(reply) => reply.into_resp(),
            Err(e) => RespValue::Error(e.to_string()),
        };
        encoder.write_frame(&response).await?;
    }

    Ok(())
}
