//! Typed operation facades over a `CommandExecutor`
//!
//! `KvTemplate` is the handle callers construct once and pass around. It
//! hands out one lightweight facade per data type; every facade method issues
//! exactly one store command.

pub mod hash;
pub mod list;
pub mod set;
pub mod value;
pub mod zset;

pub use hash::{HashOperations, ScanOptions};
pub use list::{Inserted, ListOperations, Side};
pub use set::SetOperations;
pub use value::ValueOperations;
pub use zset::{Aggregate, CombineOptions, LexBound, LexRange, Limit, ScoredMember, ZSetOperations};

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::codec::{StringCodec, ValueCodec};
use crate::connection::{Command, CommandExecutor, Reply, ToArg};
use crate::error::{OpsError, OpsResult};

/// Grace used when the template is not built from a `ClientConfig`
const DEFAULT_BLOCKING_GRACE: Duration = Duration::from_secs(1);

/// Entry point to the per-type operation facades
#[derive(Clone)]
pub struct KvTemplate {
    executor: Arc<dyn CommandExecutor>,
    blocking_grace: Duration,
}

impl KvTemplate {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            blocking_grace: DEFAULT_BLOCKING_GRACE,
        }
    }

    /// Extra time a blocking call may take past its own timeout before the
    /// facade stops waiting and reports "absent".
    pub fn with_blocking_grace(mut self, grace: Duration) -> Self {
        self.blocking_grace = grace;
        self
    }

    pub fn executor(&self) -> &Arc<dyn CommandExecutor> {
        &self.executor
    }

    pub fn ops_for_value(&self) -> ValueOperations<StringCodec> {
        self.ops_for_value_with(StringCodec)
    }

    pub fn ops_for_value_with<C: ValueCodec>(&self, codec: C) -> ValueOperations<C> {
        ValueOperations::new(self.executor.clone(), codec)
    }

    pub fn ops_for_hash(&self) -> HashOperations<StringCodec> {
        self.ops_for_hash_with(StringCodec)
    }

    pub fn ops_for_hash_with<C: ValueCodec>(&self, codec: C) -> HashOperations<C> {
        HashOperations::new(self.executor.clone(), codec)
    }

    pub fn ops_for_list(&self) -> ListOperations {
        ListOperations::new(self.executor.clone(), self.blocking_grace)
    }

    pub fn ops_for_set(&self) -> SetOperations {
        SetOperations::new(self.executor.clone())
    }

    pub fn ops_for_zset(&self) -> ZSetOperations {
        ZSetOperations::new(self.executor.clone())
    }
}

/// Numeric delta accepted by the increment operations
///
/// The reply is read back as the delta's own type.
pub trait NumericDelta: ToArg + Copy + Send + Sync + 'static {
    /// Command for string keys
    const INCR: &'static str;
    /// Command for hash fields
    const HINCR: &'static str;

    fn from_reply(reply: Reply) -> OpsResult<Self>;
}

impl NumericDelta for i64 {
    const INCR: &'static str = "INCRBY";
    const HINCR: &'static str = "HINCRBY";

    fn from_reply(reply: Reply) -> OpsResult<Self> {
        reply.into_int()
    }
}

impl NumericDelta for f64 {
    const INCR: &'static str = "INCRBYFLOAT";
    const HINCR: &'static str = "HINCRBYFLOAT";

    fn from_reply(reply: Reply) -> OpsResult<Self> {
        reply.into_f64()
    }
}

/// Runs a command that may park on the store.
///
/// A zero timeout waits forever. Otherwise the call is abandoned locally once
/// `timeout + grace` passes, which reads as "absent" like a store-side
/// timeout; dropping the pending call releases its connection.
pub(crate) async fn execute_blocking(
    executor: &Arc<dyn CommandExecutor>,
    cmd: Command,
    timeout: Duration,
    grace: Duration,
) -> OpsResult<Reply> {
    if timeout.is_zero() {
        return Ok(executor.execute_blocking(cmd).await?);
    }
    let name = cmd.name();
    let deadline = timeout.saturating_add(grace);
    match tokio::time::timeout(deadline, executor.execute_blocking(cmd)).await {
        Ok(reply) => Ok(reply?),
        Err(_) => {
            warn!("{} outlived its {:?} timeout locally, giving up", name, timeout);
            Ok(Reply::Nil)
        }
    }
}

pub(crate) fn check_score(value: f64, what: &str) -> OpsResult<()> {
    if value.is_nan() {
        Err(OpsError::InvalidArgument(format!("{} must not be NaN", what)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Executor double that records commands and replays canned replies

    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::connection::{Command, CommandExecutor, Reply};
    use crate::error::TransportResult;

    #[derive(Default)]
    pub struct Recorder {
        pub sent: Mutex<Vec<(String, bool)>>,
        pub replies: Mutex<VecDeque<Reply>>,
    }

    impl Recorder {
        pub fn with_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into_iter().collect()),
            }
        }

        /// Commands as "NAME arg arg", with whether they went the blocking path.
        pub fn sent(&self) -> Vec<(String, bool)> {
            self.sent.lock().clone()
        }

        fn next(&self, cmd: Command, blocking: bool) -> Reply {
            self.sent.lock().push((format!("{:?}", cmd), blocking));
            self.replies.lock().pop_front().unwrap_or(Reply::Nil)
        }
    }

    #[async_trait]
    impl CommandExecutor for Recorder {
        async fn execute(&self, cmd: Command) -> TransportResult<Reply> {
            Ok(self.next(cmd, false))
        }

        async fn execute_blocking(&self, cmd: Command) -> TransportResult<Reply> {
            Ok(self.next(cmd, true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Recorder;
    use super::*;

    /// Never answers, standing in for a store that ignores the timeout.
    struct Silent;

    #[async_trait::async_trait]
    impl CommandExecutor for Silent {
        async fn execute(&self, _cmd: Command) -> crate::error::TransportResult<Reply> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_blocking_call_gives_up_after_grace() {
        let executor: Arc<dyn CommandExecutor> = Arc::new(Silent);
        let started = std::time::Instant::now();
        let reply = execute_blocking(
            &executor,
            Command::new("BLPOP").arg("q").arg(0.05f64),
            Duration::from_millis(50),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        assert_eq!(reply, Reply::Nil);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_longest_timeout_is_accepted() {
        let recorder = Arc::new(Recorder::with_replies([Reply::Array(vec![
            Reply::bulk("q"),
            Reply::bulk("job"),
        ])]));
        let template = KvTemplate::new(recorder.clone());
        let popped = template
            .ops_for_list()
            .blocking_pop_left("q", Duration::MAX)
            .await
            .unwrap();
        assert_eq!(popped.as_deref(), Some("job"));
        assert_eq!(recorder.sent().len(), 1);
        assert!(recorder.sent()[0].1);
    }

    #[tokio::test]
    async fn test_increment_command_follows_delta_type() {
        let recorder = Arc::new(Recorder::with_replies([Reply::Int(3), Reply::bulk("2.5")]));
        let template = KvTemplate::new(recorder.clone());
        let ops = template.ops_for_value();
        assert_eq!(ops.increment("n", 3i64).await.unwrap(), 3);
        assert_eq!(ops.increment("f", 2.5f64).await.unwrap(), 2.5);
        let sent: Vec<String> = recorder.sent().into_iter().map(|(c, _)| c).collect();
        assert_eq!(sent, vec!["INCRBY n 3", "INCRBYFLOAT f 2.5"]);
    }
}
