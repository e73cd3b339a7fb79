//! Operations on plain string keys

use std::sync::Arc;
use std::time::Duration;

use super::NumericDelta;
use crate::codec::{StringCodec, ValueCodec};
use crate::connection::{Command, CommandExecutor};
use crate::error::{OpsError, OpsResult};

/// Scalar values stored through a codec
pub struct ValueOperations<C> {
    executor: Arc<dyn CommandExecutor>,
    codec: C,
}

impl<C: ValueCodec> ValueOperations<C> {
    pub(crate) fn new(executor: Arc<dyn CommandExecutor>, codec: C) -> Self {
        Self { executor, codec }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub async fn set(&self, key: &str, value: &C::Item) -> OpsResult<()> {
        let cmd = Command::new("SET").arg(key).arg(self.codec.encode(value)?);
        self.executor.execute(cmd).await?.expect_ok()
    }

    /// Sets the value with an expiry enforced by the store.
    pub async fn set_with_ttl(&self, key: &str, value: &C::Item, ttl: Duration) -> OpsResult<()> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Err(OpsError::InvalidArgument(
                "ttl must be at least one millisecond".to_string(),
            ));
        }
        let cmd = Command::new("SET")
            .arg(key)
            .arg(self.codec.encode(value)?)
            .arg("PX")
            .arg(millis);
        self.executor.execute(cmd).await?.expect_ok()
    }

    /// Returns `false` when the key already existed.
    pub async fn set_if_absent(&self, key: &str, value: &C::Item) -> OpsResult<bool> {
        let cmd = Command::new("SETNX").arg(key).arg(self.codec.encode(value)?);
        self.executor.execute(cmd).await?.into_bool()
    }

    pub async fn get(&self, key: &str) -> OpsResult<Option<C::Item>> {
        let reply = self.executor.execute(Command::new("GET").arg(key)).await?;
        self.decode_opt(reply.into_opt_bytes()?)
    }

    /// Stores `value` and returns what was there before.
    pub async fn get_and_set(&self, key: &str, value: &C::Item) -> OpsResult<Option<C::Item>> {
        let cmd = Command::new("GETSET").arg(key).arg(self.codec.encode(value)?);
        let reply = self.executor.execute(cmd).await?;
        self.decode_opt(reply.into_opt_bytes()?)
    }

    pub async fn multi_set(&self, entries: &[(&str, C::Item)]) -> OpsResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut cmd = Command::new("MSET");
        for (key, value) in entries {
            cmd = cmd.arg(*key).arg(self.codec.encode(value)?);
        }
        self.executor.execute(cmd).await?.expect_ok()
    }

    /// One slot per requested key, in request order.
    pub async fn multi_get(&self, keys: &[&str]) -> OpsResult<Vec<Option<C::Item>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self.executor.execute(Command::new("MGET").args(keys)).await?;
        reply
            .into_opt_bytes_vec()?
            .into_iter()
            .map(|bytes| self.decode_opt(bytes))
            .collect()
    }

    pub async fn delete(&self, key: &str) -> OpsResult<bool> {
        self.executor.execute(Command::new("DEL").arg(key)).await?.into_bool()
    }

    pub async fn delete_many(&self, keys: &[&str]) -> OpsResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.executor.execute(Command::new("DEL").args(keys)).await?.into_count()
    }

    /// INCRBY for `i64` deltas, INCRBYFLOAT for `f64`.
    pub async fn increment<D: NumericDelta>(&self, key: &str, delta: D) -> OpsResult<D> {
        let reply = self.executor.execute(Command::new(D::INCR).arg(key).arg(delta)).await?;
        D::from_reply(reply)
    }

    fn decode_opt(&self, bytes: Option<Vec<u8>>) -> OpsResult<Option<C::Item>> {
        Ok(bytes.map(|b| self.codec.decode(&b)).transpose()?)
    }
}

impl ValueOperations<StringCodec> {
    /// Appends to the stored string, creating it when missing.
    pub async fn append(&self, key: &str, suffix: &str) -> OpsResult<u64> {
        let cmd = Command::new("APPEND").arg(key).arg(suffix);
        self.executor.execute(cmd).await?.into_count()
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::JsonCodec;
    use crate::error::OpsError;
    use crate::memory::MemoryStore;
    use crate::ops::KvTemplate;
    use crate::record::ValueDto;
    use std::sync::Arc;

    fn template() -> KvTemplate {
        KvTemplate::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_append_creates_then_extends() {
        let ops = template().ops_for_value();
        assert_eq!(ops.append("greeting", "hello").await.unwrap(), 5);
        assert_eq!(ops.append("greeting", " world").await.unwrap(), 11);
        assert_eq!(ops.get("greeting").await.unwrap().as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_a_codec_error() {
        let template = template();
        template
            .ops_for_value()
            .set("dto", &"{\"firstExampleValue\":".to_string())
            .await
            .unwrap();
        let typed = template.ops_for_value_with(JsonCodec::<ValueDto>::default());
        assert!(matches!(typed.get("dto").await, Err(OpsError::Codec(_))));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected_locally() {
        let ops = template().ops_for_value();
        let err = ops
            .set_with_ttl("k", &"v".to_string(), std::time::Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::InvalidArgument(_)));
    }
}
