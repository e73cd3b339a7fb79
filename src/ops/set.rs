//! Operations on set keys

use std::collections::HashSet;
use std::sync::Arc;

use crate::connection::{Command, CommandExecutor, Reply};
use crate::error::OpsResult;

/// Unordered unique raw strings
pub struct SetOperations {
    executor: Arc<dyn CommandExecutor>,
}

impl SetOperations {
    pub(crate) fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    async fn run(&self, cmd: Command) -> OpsResult<Reply> {
        Ok(self.executor.execute(cmd).await?)
    }

    /// `false` when the value was already a member.
    pub async fn add(&self, key: &str, value: &str) -> OpsResult<bool> {
        self.run(Command::new("SADD").arg(key).arg(value)).await?.into_bool()
    }

    /// Returns how many values were new.
    pub async fn add_all(&self, key: &str, values: &[&str]) -> OpsResult<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        self.run(Command::new("SADD").arg(key).args(values)).await?.into_count()
    }

    pub async fn remove(&self, key: &str, values: &[&str]) -> OpsResult<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        self.run(Command::new("SREM").arg(key).args(values)).await?.into_count()
    }

    pub async fn size(&self, key: &str) -> OpsResult<u64> {
        self.run(Command::new("SCARD").arg(key)).await?.into_count()
    }

    pub async fn members(&self, key: &str) -> OpsResult<HashSet<String>> {
        collect_set(self.run(Command::new("SMEMBERS").arg(key)).await?)
    }

    pub async fn is_member(&self, key: &str, value: &str) -> OpsResult<bool> {
        self.run(Command::new("SISMEMBER").arg(key).arg(value))
            .await?
            .into_bool()
    }

    /// Atomic SMOVE; `false` when `value` was not in `src`.
    pub async fn move_member(&self, src: &str, dst: &str, value: &str) -> OpsResult<bool> {
        self.run(Command::new("SMOVE").arg(src).arg(dst).arg(value))
            .await?
            .into_bool()
    }

    /// Removes and returns a random member.
    pub async fn pop(&self, key: &str) -> OpsResult<Option<String>> {
        self.run(Command::new("SPOP").arg(key)).await?.into_opt_string()
    }

    /// Up to `count` distinct random members, fewer when the set is smaller.
    pub async fn pop_count(&self, key: &str, count: u64) -> OpsResult<Vec<String>> {
        self.run(Command::new("SPOP").arg(key).arg(count))
            .await?
            .into_strings()
    }

    /// Like `pop` but leaves the set untouched.
    pub async fn random_member(&self, key: &str) -> OpsResult<Option<String>> {
        self.run(Command::new("SRANDMEMBER").arg(key))
            .await?
            .into_opt_string()
    }

    /// Members of `key` absent from every key in `others`.
    pub async fn difference(&self, key: &str, others: &[&str]) -> OpsResult<HashSet<String>> {
        collect_set(self.run(Command::new("SDIFF").arg(key).args(others)).await?)
    }

    pub async fn intersect(&self, key: &str, others: &[&str]) -> OpsResult<HashSet<String>> {
        collect_set(self.run(Command::new("SINTER").arg(key).args(others)).await?)
    }

    pub async fn union(&self, key: &str, others: &[&str]) -> OpsResult<HashSet<String>> {
        collect_set(self.run(Command::new("SUNION").arg(key).args(others)).await?)
    }

    /// Replaces `dest` with the difference and returns its size.
    pub async fn difference_and_store(&self, key: &str, others: &[&str], dest: &str) -> OpsResult<u64> {
        self.store("SDIFFSTORE", key, others, dest).await
    }

    pub async fn intersect_and_store(&self, key: &str, others: &[&str], dest: &str) -> OpsResult<u64> {
        self.store("SINTERSTORE", key, others, dest).await
    }

    pub async fn union_and_store(&self, key: &str, others: &[&str], dest: &str) -> OpsResult<u64> {
        self.store("SUNIONSTORE", key, others, dest).await
    }

    async fn store(&self, name: &'static str, key: &str, others: &[&str], dest: &str) -> OpsResult<u64> {
        let cmd = Command::new(name).arg(dest).arg(key).args(others);
        self.run(cmd).await?.into_count()
    }
}

fn collect_set(reply: Reply) -> OpsResult<HashSet<String>> {
    Ok(reply.into_strings()?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::ops::KvTemplate;

    fn ops() -> SetOperations {
        KvTemplate::new(Arc::new(MemoryStore::new())).ops_for_set()
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_two_key_form_equals_general_form() {
        let sets = ops();
        sets.add_all("a", &["1", "2", "3"]).await.unwrap();
        sets.add_all("b", &["2", "3", "4"]).await.unwrap();
        sets.add_all("c", &["3"]).await.unwrap();
        assert_eq!(sets.difference("a", &["b"]).await.unwrap(), set(&["1"]));
        assert_eq!(sets.intersect("a", &["b", "c"]).await.unwrap(), set(&["3"]));
        assert_eq!(sets.union("a", &["b"]).await.unwrap(), set(&["1", "2", "3", "4"]));
    }

    #[tokio::test]
    async fn test_pop_count_never_exceeds_set() {
        let sets = ops();
        sets.add_all("s", &["x", "y"]).await.unwrap();
        let popped = sets.pop_count("s", 5).await.unwrap();
        assert_eq!(popped.iter().cloned().collect::<HashSet<_>>(), set(&["x", "y"]));
        assert_eq!(sets.size("s").await.unwrap(), 0);
        assert_eq!(sets.pop("s").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_move_member_is_all_or_nothing() {
        let sets = ops();
        sets.add("src", "m").await.unwrap();
        assert!(!sets.move_member("src", "dst", "missing").await.unwrap());
        assert!(sets.move_member("src", "dst", "m").await.unwrap());
        assert!(!sets.is_member("src", "m").await.unwrap());
        assert!(sets.is_member("dst", "m").await.unwrap());
    }
}
