//! In-process store speaking the same commands as the remote one
//!
//! `MemoryStore` is a `CommandExecutor`, so every facade runs unchanged on
//! top of it. All commands run under one write lock; blocking list reads
//! park on a `Notify` that list-growing commands signal.
//!
//! Snapshots exist so the demo server can be restarted with its keys. They
//! are a one-shot dump, not durability: nothing is written between the
//! load at startup and the dump at shutdown.

mod dispatch;
mod keyspace;
pub mod server;
mod zset;

pub use keyspace::{StoreError, StoreResult};
pub use server::MemoryServer;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::connection::{Command, CommandExecutor, Reply};
use crate::error::TransportResult;
use dispatch::End;
use keyspace::{Entry, Keyspace, RedisValue};

#[derive(Default)]
struct Shared {
    keyspace: RwLock<Keyspace>,
    lists_grew: Notify,
}

/// Shared, cloneable in-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotData {
    entries: HashMap<Vec<u8>, (RedisValue, Option<u64>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one command by name. Blocking commands wait here.
    pub async fn run(&self, name: &str, args: &[Vec<u8>]) -> StoreResult<Reply> {
        debug!("memory store: {} ({} args)", name, args.len());
        match name.to_ascii_uppercase().as_str() {
            "BLPOP" => self.blocking_pop(args, End::Left, "blpop").await,
            "BRPOP" => self.blocking_pop(args, End::Right, "brpop").await,
            "BRPOPLPUSH" => self.blocking_move(args).await,
            _ => {
                let reply = dispatch::apply(&mut self.shared.keyspace.write(), name, args)?;
                if dispatch::grows_lists(name) {
                    self.shared.lists_grew.notify_waiters();
                }
                Ok(reply)
            }
        }
    }

    /// BLPOP / BRPOP: `key [key ...] timeout`, replies `[key, value]` or nil.
    async fn blocking_pop(&self, args: &[Vec<u8>], end: End, cmd: &str) -> StoreResult<Reply> {
        let Some((timeout, keys)) = args.split_last().filter(|(_, keys)| !keys.is_empty()) else {
            return Err(StoreError::WrongArity(cmd.to_string()));
        };
        let timeout = parse_timeout(timeout)?;
        self.wait_until(timeout, |ks| {
            for key in keys {
                if let Some(value) = dispatch::pop(ks, key, end)? {
                    return Ok(Some(Reply::Array(vec![
                        Reply::Bulk(key.clone()),
                        Reply::Bulk(value),
                    ])));
                }
            }
            Ok(None)
        })
        .await
    }

    /// BRPOPLPUSH: `src dst timeout`
    async fn blocking_move(&self, args: &[Vec<u8>]) -> StoreResult<Reply> {
        let [src, dst, timeout] = args else {
            return Err(StoreError::WrongArity("brpoplpush".to_string()));
        };
        let timeout = parse_timeout(timeout)?;
        let reply = self
            .wait_until(timeout, |ks| {
                Ok(dispatch::rpoplpush(ks, src, dst)?.map(Reply::Bulk))
            })
            .await?;
        if reply != Reply::Nil {
            self.shared.lists_grew.notify_waiters();
        }
        Ok(reply)
    }

    /// Retries `attempt` each time a list grows until it yields a reply or
    /// the timeout passes. `None` waits forever.
    async fn wait_until<F>(&self, timeout: Option<Duration>, mut attempt: F) -> StoreResult<Reply>
    where
        F: FnMut(&mut Keyspace) -> StoreResult<Option<Reply>>,
    {
        // a deadline too far out to represent is no deadline
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            let notified = self.shared.lists_grew.notified();
            tokio::pin!(notified);
            // register before looking so a push in between is not missed
            notified.as_mut().enable();

            let found = {
                let mut ks = self.shared.keyspace.write();
                attempt(&mut ks)?
            };
            if let Some(reply) = found {
                return Ok(reply);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        debug!("memory store: blocking wait timed out");
                        return Ok(Reply::Nil);
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Dumps all live keys for the demo server; expiry is kept as remaining
    /// milliseconds.
    pub fn create_snapshot(&self) -> bincode::Result<Vec<u8>> {
        let ks = self.shared.keyspace.read();
        let entries = ks
            .live_entries()
            .map(|(k, e)| {
                let ttl = u64::try_from(e.ttl_millis()).ok();
                (k.clone(), (e.value.clone(), ttl))
            })
            .collect();
        bincode::serialize(&SnapshotData { entries })
    }

    /// Replaces the whole keyspace with a snapshot's contents.
    pub fn restore_from_snapshot(&self, snapshot: &[u8]) -> bincode::Result<()> {
        let snap: SnapshotData = bincode::deserialize(snapshot)?;
        let mut ks = self.shared.keyspace.write();
        ks.clear();
        for (key, (value, ttl_ms)) in snap.entries {
            let entry = match ttl_ms {
                Some(ms) => Entry::with_ttl(value, Duration::from_millis(ms)),
                None => Entry::new(value),
            };
            ks.insert(key, entry);
        }
        info!("Restored memory store from snapshot, {} keys", ks.len());
        drop(ks);
        self.shared.lists_grew.notify_waiters();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.shared.keyspace.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Seconds as a float; zero, or a value too large for a `Duration`, means no timeout.
fn parse_timeout(raw: &[u8]) -> StoreResult<Option<Duration>> {
    let secs = std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| StoreError::InvalidArgument("timeout is not a float or out of range".to_string()))?;
    if secs < 0.0 {
        return Err(StoreError::InvalidArgument("timeout is negative".to_string()));
    }
    Ok((secs > 0.0)
        .then(|| Duration::try_from_secs_f64(secs).ok())
        .flatten())
}

#[async_trait]
impl CommandExecutor for MemoryStore {
    async fn execute(&self, cmd: Command) -> TransportResult<Reply> {
        let (name, args) = cmd.into_parts();
        Ok(self.run(name, &args).await?)
    }
}
