//! Operations on list keys, including the blocking pops

use std::sync::Arc;
use std::time::Duration;

use super::execute_blocking;
use crate::connection::{Command, CommandExecutor, Reply};
use crate::error::{OpsError, OpsResult, TransportError};

/// Which side of the pivot `insert` places the new value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Before => "BEFORE",
            Side::After => "AFTER",
        }
    }
}

/// Outcome of a pivot-relative insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// The value went in; the list now has this many elements.
    Length(u64),
    /// No element equal to the pivot (or no list at all). Nothing changed.
    PivotNotFound,
}

/// Ordered sequences of raw strings
pub struct ListOperations {
    executor: Arc<dyn CommandExecutor>,
    blocking_grace: Duration,
}

impl ListOperations {
    pub(crate) fn new(executor: Arc<dyn CommandExecutor>, blocking_grace: Duration) -> Self {
        Self {
            executor,
            blocking_grace,
        }
    }

    async fn run(&self, cmd: Command) -> OpsResult<Reply> {
        Ok(self.executor.execute(cmd).await?)
    }

    pub async fn push_right(&self, key: &str, value: &str) -> OpsResult<u64> {
        self.run(Command::new("RPUSH").arg(key).arg(value)).await?.into_count()
    }

    pub async fn push_left(&self, key: &str, value: &str) -> OpsResult<u64> {
        self.run(Command::new("LPUSH").arg(key).arg(value)).await?.into_count()
    }

    /// Appends all values in order with one RPUSH.
    pub async fn push_all_right(&self, key: &str, values: &[&str]) -> OpsResult<u64> {
        if values.is_empty() {
            return self.length(key).await;
        }
        self.run(Command::new("RPUSH").arg(key).args(values)).await?.into_count()
    }

    /// Prepends values one after another, so the last one ends up first.
    pub async fn push_all_left(&self, key: &str, values: &[&str]) -> OpsResult<u64> {
        if values.is_empty() {
            return self.length(key).await;
        }
        self.run(Command::new("LPUSH").arg(key).args(values)).await?.into_count()
    }

    /// `None` when the key does not exist; the list is never created.
    pub async fn push_right_if_present(&self, key: &str, value: &str) -> OpsResult<Option<u64>> {
        let len = self.run(Command::new("RPUSHX").arg(key).arg(value)).await?.into_count()?;
        Ok((len > 0).then_some(len))
    }

    /// `None` when the key does not exist; the list is never created.
    pub async fn push_left_if_present(&self, key: &str, value: &str) -> OpsResult<Option<u64>> {
        let len = self.run(Command::new("LPUSHX").arg(key).arg(value)).await?.into_count()?;
        Ok((len > 0).then_some(len))
    }

    /// Inserts next to the first element equal to `pivot`.
    pub async fn insert(&self, key: &str, side: Side, pivot: &str, value: &str) -> OpsResult<Inserted> {
        let cmd = Command::new("LINSERT")
            .arg(key)
            .arg(side.as_str())
            .arg(pivot)
            .arg(value);
        // -1: pivot missing, 0: key missing
        match self.run(cmd).await?.into_int()? {
            len if len > 0 => Ok(Inserted::Length(len as u64)),
            _ => Ok(Inserted::PivotNotFound),
        }
    }

    pub async fn pop_right(&self, key: &str) -> OpsResult<Option<String>> {
        self.run(Command::new("RPOP").arg(key)).await?.into_opt_string()
    }

    pub async fn pop_left(&self, key: &str) -> OpsResult<Option<String>> {
        self.run(Command::new("LPOP").arg(key)).await?.into_opt_string()
    }

    /// Reads one element; negative indexes count from the tail.
    pub async fn get_at(&self, key: &str, index: i64) -> OpsResult<Option<String>> {
        self.run(Command::new("LINDEX").arg(key).arg(index)).await?.into_opt_string()
    }

    /// Overwrites one element. Never grows the list.
    pub async fn set_at(&self, key: &str, index: i64, value: &str) -> OpsResult<()> {
        let cmd = Command::new("LSET").arg(key).arg(index).arg(value);
        match self.executor.execute(cmd).await {
            Ok(reply) => reply.expect_ok(),
            Err(TransportError::Server(msg)) if msg.contains("index out of range") => {
                Err(OpsError::IndexOutOfRange {
                    key: key.to_string(),
                    index,
                })
            }
            Err(TransportError::Server(msg)) if msg.contains("no such key") => {
                Err(OpsError::NoSuchKey(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 0 for a missing key.
    pub async fn length(&self, key: &str) -> OpsResult<u64> {
        self.run(Command::new("LLEN").arg(key)).await?.into_count()
    }

    /// Inclusive range; `(0, -1)` is the whole list.
    pub async fn range(&self, key: &str, start: i64, stop: i64) -> OpsResult<Vec<String>> {
        self.run(Command::new("LRANGE").arg(key).arg(start).arg(stop))
            .await?
            .into_strings()
    }

    /// Keeps only the inclusive range; an empty range deletes the key.
    pub async fn trim(&self, key: &str, start: i64, stop: i64) -> OpsResult<()> {
        self.run(Command::new("LTRIM").arg(key).arg(start).arg(stop))
            .await?
            .expect_ok()
    }

    /// Removes occurrences of `value`: the first `count` from the head when
    /// positive, from the tail when negative, all of them when zero.
    pub async fn remove(&self, key: &str, count: i64, value: &str) -> OpsResult<u64> {
        self.run(Command::new("LREM").arg(key).arg(count).arg(value))
            .await?
            .into_count()
    }

    /// Atomically moves the tail of `src` to the head of `dst`.
    pub async fn pop_right_push_left(&self, src: &str, dst: &str) -> OpsResult<Option<String>> {
        self.run(Command::new("RPOPLPUSH").arg(src).arg(dst))
            .await?
            .into_opt_string()
    }

    /// BRPOP. `Duration::ZERO` waits without deadline.
    pub async fn blocking_pop_right(&self, key: &str, timeout: Duration) -> OpsResult<Option<String>> {
        self.blocking_pop("BRPOP", key, timeout).await
    }

    /// BLPOP. `Duration::ZERO` waits without deadline.
    pub async fn blocking_pop_left(&self, key: &str, timeout: Duration) -> OpsResult<Option<String>> {
        self.blocking_pop("BLPOP", key, timeout).await
    }

    /// BRPOPLPUSH; the wait applies to `src` only.
    pub async fn blocking_pop_right_push_left(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> OpsResult<Option<String>> {
        let cmd = Command::new("BRPOPLPUSH")
            .arg(src)
            .arg(dst)
            .arg(timeout.as_secs_f64());
        execute_blocking(&self.executor, cmd, timeout, self.blocking_grace)
            .await?
            .into_opt_string()
    }

    async fn blocking_pop(&self, name: &'static str, key: &str, timeout: Duration) -> OpsResult<Option<String>> {
        let cmd = Command::new(name).arg(key).arg(timeout.as_secs_f64());
        let reply = execute_blocking(&self.executor, cmd, timeout, self.blocking_grace).await?;
        // [key, value] or nil
        match reply.into_array()?.pop() {
            Some(value) => value.into_opt_string(),
            None => Ok(None),
        }
    }
}
