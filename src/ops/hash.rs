//! Operations on hash keys

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::Stream;

use super::NumericDelta;
use crate::codec::ValueCodec;
use crate::connection::{Command, CommandExecutor, Reply, bytes_to_string};
use crate::error::{OpsError, OpsResult};

/// Options for an incremental HSCAN walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Glob applied to field names by the store
    pub pattern: Option<String>,
    /// Batch size hint per round trip
    pub count: Option<u64>,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}

/// Field/value maps stored under a key; values go through the codec
pub struct HashOperations<C> {
    executor: Arc<dyn CommandExecutor>,
    codec: C,
}

struct ScanState {
    /// `None` once the store reported the final cursor
    cursor: Option<String>,
    pending: VecDeque<(String, Vec<u8>)>,
}

impl<C: ValueCodec> HashOperations<C> {
    pub(crate) fn new(executor: Arc<dyn CommandExecutor>, codec: C) -> Self {
        Self { executor, codec }
    }

    pub async fn has_field(&self, key: &str, field: &str) -> OpsResult<bool> {
        let cmd = Command::new("HEXISTS").arg(key).arg(field);
        self.executor.execute(cmd).await?.into_bool()
    }

    /// Length in bytes of the stored (encoded) value, 0 when absent.
    pub async fn field_value_length(&self, key: &str, field: &str) -> OpsResult<u64> {
        let cmd = Command::new("HSTRLEN").arg(key).arg(field);
        self.executor.execute(cmd).await?.into_count()
    }

    pub async fn size(&self, key: &str) -> OpsResult<u64> {
        self.executor.execute(Command::new("HLEN").arg(key)).await?.into_count()
    }

    pub async fn fields(&self, key: &str) -> OpsResult<HashSet<String>> {
        let reply = self.executor.execute(Command::new("HKEYS").arg(key)).await?;
        Ok(reply.into_strings()?.into_iter().collect())
    }

    pub async fn get(&self, key: &str, field: &str) -> OpsResult<Option<C::Item>> {
        let reply = self.executor.execute(Command::new("HGET").arg(key).arg(field)).await?;
        self.decode_opt(reply.into_opt_bytes()?)
    }

    /// One slot per requested field, in request order.
    pub async fn multi_get(&self, key: &str, fields: &[&str]) -> OpsResult<Vec<Option<C::Item>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self
            .executor
            .execute(Command::new("HMGET").arg(key).args(fields))
            .await?;
        reply
            .into_opt_bytes_vec()?
            .into_iter()
            .map(|bytes| self.decode_opt(bytes))
            .collect()
    }

    pub async fn entries(&self, key: &str) -> OpsResult<HashMap<String, C::Item>> {
        let reply = self.executor.execute(Command::new("HGETALL").arg(key)).await?;
        pairs(reply.into_array()?)?
            .into_iter()
            .map(|(field, value)| -> OpsResult<(String, C::Item)> {
                Ok((field, self.codec.decode(&value)?))
            })
            .collect()
    }

    pub async fn values(&self, key: &str) -> OpsResult<Vec<C::Item>> {
        let reply = self.executor.execute(Command::new("HVALS").arg(key)).await?;
        reply
            .into_opt_bytes_vec()?
            .into_iter()
            .map(|bytes| -> OpsResult<C::Item> {
                let bytes = bytes.ok_or_else(|| {
                    OpsError::UnexpectedReply("nil inside HVALS reply".to_string())
                })?;
                Ok(self.codec.decode(&bytes)?)
            })
            .collect()
    }

    /// Sets one field, overwriting any previous value.
    pub async fn put(&self, key: &str, field: &str, value: &C::Item) -> OpsResult<()> {
        let cmd = Command::new("HSET")
            .arg(key)
            .arg(field)
            .arg(self.codec.encode(value)?);
        self.executor.execute(cmd).await?.into_count()?;
        Ok(())
    }

    pub async fn put_if_absent(&self, key: &str, field: &str, value: &C::Item) -> OpsResult<bool> {
        let cmd = Command::new("HSETNX")
            .arg(key)
            .arg(field)
            .arg(self.codec.encode(value)?);
        self.executor.execute(cmd).await?.into_bool()
    }

    pub async fn put_all(&self, key: &str, entries: &HashMap<String, C::Item>) -> OpsResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut cmd = Command::new("HSET").arg(key);
        for (field, value) in entries {
            cmd = cmd.arg(field).arg(self.codec.encode(value)?);
        }
        self.executor.execute(cmd).await?.into_count()?;
        Ok(())
    }

    /// Returns how many of the fields existed.
    pub async fn delete_fields(&self, key: &str, fields: &[&str]) -> OpsResult<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let cmd = Command::new("HDEL").arg(key).args(fields);
        self.executor.execute(cmd).await?.into_count()
    }

    /// HINCRBY for `i64` deltas, HINCRBYFLOAT for `f64`.
    pub async fn increment<D: NumericDelta>(&self, key: &str, field: &str, delta: D) -> OpsResult<D> {
        let cmd = Command::new(D::HINCR).arg(key).arg(field).arg(delta);
        D::from_reply(self.executor.execute(cmd).await?)
    }

    /// Lazily walks the hash with HSCAN.
    ///
    /// Each batch is fetched when the previous one is drained. The stream
    /// ends after the store returns cursor `0` or after the first error.
    /// Fields changed during the walk may be missed or seen twice, as the
    /// store's cursor guarantees allow.
    pub fn scan<'a>(
        &'a self,
        key: &'a str,
        options: ScanOptions,
    ) -> impl Stream<Item = OpsResult<(String, C::Item)>> + 'a {
        let state = ScanState {
            cursor: Some("0".to_string()),
            pending: VecDeque::new(),
        };
        futures::stream::try_unfold(state, move |state| {
            let options = options.clone();
            async move { self.scan_step(key, &options, state).await }
        })
    }

    /// Yields the next buffered pair, fetching a page first when needed.
    async fn scan_step(
        &self,
        key: &str,
        options: &ScanOptions,
        mut state: ScanState,
    ) -> OpsResult<Option<((String, C::Item), ScanState)>> {
        loop {
            if let Some((field, bytes)) = state.pending.pop_front() {
                let value = self.codec.decode(&bytes)?;
                return Ok(Some(((field, value), state)));
            }
            let Some(cursor) = state.cursor.take() else {
                return Ok(None);
            };
            let mut cmd = Command::new("HSCAN").arg(key).arg(&cursor);
            if let Some(pattern) = &options.pattern {
                cmd = cmd.arg("MATCH").arg(pattern);
            }
            if let Some(count) = options.count {
                cmd = cmd.arg("COUNT").arg(count);
            }
            let (next, batch) = scan_page(self.executor.execute(cmd).await?)?;
            state.pending.extend(batch);
            state.cursor = (next != "0").then_some(next);
        }
    }

    fn decode_opt(&self, bytes: Option<Vec<u8>>) -> OpsResult<Option<C::Item>> {
        Ok(bytes.map(|b| self.codec.decode(&b)).transpose()?)
    }
}

/// Splits `[cursor, [f1, v1, f2, v2, ...]]`.
fn scan_page(reply: Reply) -> OpsResult<(String, Vec<(String, Vec<u8>)>)> {
    let mut parts = reply.into_array()?.into_iter();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(cursor), Some(batch), None) => Ok((cursor.into_string()?, pairs(batch.into_array()?)?)),
        _ => Err(OpsError::UnexpectedReply("malformed HSCAN reply".to_string())),
    }
}

/// Flat `[field, value, ...]` into pairs
fn pairs(items: Vec<Reply>) -> OpsResult<Vec<(String, Vec<u8>)>> {
    if items.len() % 2 != 0 {
        return Err(OpsError::UnexpectedReply(
            "odd number of elements in field/value reply".to_string(),
        ));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        let field = bytes_to_string(field.into_opt_bytes()?.unwrap_or_default())?;
        out.push((field, value.into_opt_bytes()?.unwrap_or_default()));
    }
    Ok(out)
}
