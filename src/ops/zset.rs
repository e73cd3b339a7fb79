//! Operations on sorted-set keys
//!
//! Members are ordered by score ascending, ties broken by member bytes.
//! Score ranges are inclusive on both ends.

use std::sync::Arc;

use crate::connection::{Command, CommandExecutor, Reply};
use crate::error::{OpsError, OpsResult};

use super::check_score;

/// Offset/count pagination for range queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub offset: u64,
    pub count: u64,
}

impl Limit {
    pub fn new(offset: u64, count: u64) -> Self {
        Self { offset, count }
    }
}

/// One end of a lexicographic range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexBound {
    Inclusive(String),
    Exclusive(String),
    /// `-` as a minimum, `+` as a maximum
    Unbounded,
}

impl LexBound {
    pub fn inclusive(value: impl Into<String>) -> Self {
        LexBound::Inclusive(value.into())
    }

    pub fn exclusive(value: impl Into<String>) -> Self {
        LexBound::Exclusive(value.into())
    }

    fn to_wire(&self, unbounded: &str) -> String {
        match self {
            LexBound::Inclusive(v) => format!("[{}", v),
            LexBound::Exclusive(v) => format!("({}", v),
            LexBound::Unbounded => unbounded.to_string(),
        }
    }
}

/// Bounds for ZRANGEBYLEX
///
/// An unbounded minimum is always `-` and an unbounded maximum always `+`,
/// so an inverted open range cannot be expressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexRange {
    pub min: LexBound,
    pub max: LexBound,
}

impl LexRange {
    pub fn new(min: LexBound, max: LexBound) -> Self {
        Self { min, max }
    }

    pub fn all() -> Self {
        Self::new(LexBound::Unbounded, LexBound::Unbounded)
    }
}

/// How scores of a member present in several sources are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

impl Aggregate {
    fn as_str(self) -> &'static str {
        match self {
            Aggregate::Sum => "SUM",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }
}

/// Options for `intersect_and_store` / `union_and_store`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombineOptions {
    pub aggregate: Aggregate,
    /// One multiplier per source, primary key first. `None` means all 1.
    pub weights: Option<Vec<f64>>,
}

impl CombineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn weights(mut self, weights: impl Into<Vec<f64>>) -> Self {
        self.weights = Some(weights.into());
        self
    }
}

/// A member paired with its score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

impl ScoredMember {
    pub fn new(member: impl Into<String>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// Score-ordered unique raw strings
pub struct ZSetOperations {
    executor: Arc<dyn CommandExecutor>,
}

impl ZSetOperations {
    pub(crate) fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    async fn run(&self, cmd: Command) -> OpsResult<Reply> {
        Ok(self.executor.execute(cmd).await?)
    }

    /// `false` means the member existed and was only rescored.
    pub async fn add(&self, key: &str, member: &str, score: f64) -> OpsResult<bool> {
        check_score(score, "score")?;
        self.run(Command::new("ZADD").arg(key).arg(score).arg(member))
            .await?
            .into_bool()
    }

    /// Returns how many members were new.
    pub async fn add_all(&self, key: &str, members: &[(&str, f64)]) -> OpsResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut cmd = Command::new("ZADD").arg(key);
        for (member, score) in members {
            check_score(*score, "score")?;
            cmd = cmd.arg(*score).arg(*member);
        }
        self.run(cmd).await?.into_count()
    }

    /// Adds `delta`, creating the member at `delta` when absent.
    pub async fn increment_score(&self, key: &str, member: &str, delta: f64) -> OpsResult<f64> {
        check_score(delta, "delta")?;
        self.run(Command::new("ZINCRBY").arg(key).arg(delta).arg(member))
            .await?
            .into_f64()
    }

    pub async fn score(&self, key: &str, member: &str) -> OpsResult<Option<f64>> {
        self.run(Command::new("ZSCORE").arg(key).arg(member))
            .await?
            .into_opt_f64()
    }

    pub async fn size(&self, key: &str) -> OpsResult<u64> {
        self.run(Command::new("ZCARD").arg(key)).await?.into_count()
    }

    /// Members with `min <= score <= max`.
    pub async fn count(&self, key: &str, min: f64, max: f64) -> OpsResult<u64> {
        check_bounds(min, max)?;
        self.run(Command::new("ZCOUNT").arg(key).arg(min).arg(max))
            .await?
            .into_count()
    }

    /// Ascending by position; `(0, -1)` is everything.
    pub async fn range(&self, key: &str, start: i64, stop: i64) -> OpsResult<Vec<String>> {
        self.run(Command::new("ZRANGE").arg(key).arg(start).arg(stop))
            .await?
            .into_strings()
    }

    pub async fn reverse_range(&self, key: &str, start: i64, stop: i64) -> OpsResult<Vec<String>> {
        self.run(Command::new("ZREVRANGE").arg(key).arg(start).arg(stop))
            .await?
            .into_strings()
    }

    pub async fn range_with_scores(&self, key: &str, start: i64, stop: i64) -> OpsResult<Vec<ScoredMember>> {
        let cmd = Command::new("ZRANGE").arg(key).arg(start).arg(stop).arg("WITHSCORES");
        scored(self.run(cmd).await?)
    }

    pub async fn reverse_range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> OpsResult<Vec<ScoredMember>> {
        let cmd = Command::new("ZREVRANGE").arg(key).arg(start).arg(stop).arg("WITHSCORES");
        scored(self.run(cmd).await?)
    }

    pub async fn range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<Limit>,
    ) -> OpsResult<Vec<String>> {
        check_bounds(min, max)?;
        let cmd = Command::new("ZRANGEBYSCORE").arg(key).arg(min).arg(max);
        self.run(with_limit(cmd, limit)).await?.into_strings()
    }

    /// Highest score first; the limit counts from the top.
    pub async fn reverse_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<Limit>,
    ) -> OpsResult<Vec<String>> {
        check_bounds(min, max)?;
        let cmd = Command::new("ZREVRANGEBYSCORE").arg(key).arg(max).arg(min);
        self.run(with_limit(cmd, limit)).await?.into_strings()
    }

    pub async fn range_by_score_with_scores(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<Limit>,
    ) -> OpsResult<Vec<ScoredMember>> {
        check_bounds(min, max)?;
        let cmd = Command::new("ZRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .arg("WITHSCORES");
        scored(self.run(with_limit(cmd, limit)).await?)
    }

    /// Highest score first, limit included.
    pub async fn reverse_range_by_score_with_scores(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<Limit>,
    ) -> OpsResult<Vec<ScoredMember>> {
        check_bounds(min, max)?;
        let cmd = Command::new("ZREVRANGEBYSCORE")
            .arg(key)
            .arg(max)
            .arg(min)
            .arg("WITHSCORES");
        scored(self.run(with_limit(cmd, limit)).await?)
    }

    /// Only meaningful when every member in range has the same score.
    pub async fn range_by_lex(&self, key: &str, range: &LexRange, limit: Option<Limit>) -> OpsResult<Vec<String>> {
        let cmd = Command::new("ZRANGEBYLEX")
            .arg(key)
            .arg(range.min.to_wire("-"))
            .arg(range.max.to_wire("+"));
        self.run(with_limit(cmd, limit)).await?.into_strings()
    }

    /// Ascending position, `None` when not a member.
    pub async fn rank(&self, key: &str, member: &str) -> OpsResult<Option<u64>> {
        rank(self.run(Command::new("ZRANK").arg(key).arg(member)).await?)
    }

    pub async fn reverse_rank(&self, key: &str, member: &str) -> OpsResult<Option<u64>> {
        rank(self.run(Command::new("ZREVRANK").arg(key).arg(member)).await?)
    }

    pub async fn remove(&self, key: &str, members: &[&str]) -> OpsResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        self.run(Command::new("ZREM").arg(key).args(members))
            .await?
            .into_count()
    }

    /// Removes by ascending position, inclusive.
    pub async fn remove_range(&self, key: &str, start: i64, stop: i64) -> OpsResult<u64> {
        self.run(Command::new("ZREMRANGEBYRANK").arg(key).arg(start).arg(stop))
            .await?
            .into_count()
    }

    pub async fn remove_range_by_score(&self, key: &str, min: f64, max: f64) -> OpsResult<u64> {
        check_bounds(min, max)?;
        self.run(Command::new("ZREMRANGEBYSCORE").arg(key).arg(min).arg(max))
            .await?
            .into_count()
    }

    /// Members present in `key` and every key in `others`, written to `dest`.
    pub async fn intersect_and_store(
        &self,
        key: &str,
        others: &[&str],
        dest: &str,
        options: &CombineOptions,
    ) -> OpsResult<u64> {
        self.combine("ZINTERSTORE", key, others, dest, options).await
    }

    /// Members present in any source, written to `dest`.
    pub async fn union_and_store(
        &self,
        key: &str,
        others: &[&str],
        dest: &str,
        options: &CombineOptions,
    ) -> OpsResult<u64> {
        self.combine("ZUNIONSTORE", key, others, dest, options).await
    }

    async fn combine(
        &self,
        name: &'static str,
        key: &str,
        others: &[&str],
        dest: &str,
        options: &CombineOptions,
    ) -> OpsResult<u64> {
        let sources = 1 + others.len();
        let mut cmd = Command::new(name).arg(dest).arg(sources).arg(key).args(others);
        if let Some(weights) = &options.weights {
            if weights.len() != sources {
                return Err(OpsError::InvalidArgument(format!(
                    "{} weights given for {} source keys",
                    weights.len(),
                    sources
                )));
            }
            for w in weights {
                check_score(*w, "weight")?;
            }
            cmd = cmd.arg("WEIGHTS").args(weights);
        }
        cmd = cmd.arg("AGGREGATE").arg(options.aggregate.as_str());
        self.run(cmd).await?.into_count()
    }
}

fn check_bounds(min: f64, max: f64) -> OpsResult<()> {
    check_score(min, "min")?;
    check_score(max, "max")
}

fn with_limit(cmd: Command, limit: Option<Limit>) -> Command {
    match limit {
        Some(Limit { offset, count }) => cmd.arg("LIMIT").arg(offset).arg(count),
        None => cmd,
    }
}

fn rank(reply: Reply) -> OpsResult<Option<u64>> {
    match reply.into_opt_int()? {
        Some(r) => u64::try_from(r)
            .map(Some)
            .map_err(|_| OpsError::UnexpectedReply(format!("negative rank {}", r))),
        None => Ok(None),
    }
}

/// Flat `[member, score, ...]` into pairs
fn scored(reply: Reply) -> OpsResult<Vec<ScoredMember>> {
    let items = reply.into_array()?;
    if items.len() % 2 != 0 {
        return Err(OpsError::UnexpectedReply(
            "odd number of elements in WITHSCORES reply".to_string(),
        ));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(member), Some(score)) = (iter.next(), iter.next()) {
        out.push(ScoredMember {
            member: member.into_string()?,
            score: score.into_f64()?,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::KvTemplate;
    use crate::ops::testing::Recorder;

    fn recorder_ops(replies: Vec<Reply>) -> (Arc<Recorder>, ZSetOperations) {
        let recorder = Arc::new(Recorder::with_replies(replies));
        let ops = KvTemplate::new(recorder.clone()).ops_for_zset();
        (recorder, ops)
    }

    #[tokio::test]
    async fn test_weights_length_is_checked_before_sending() {
        let (recorder, zsets) = recorder_ops(vec![]);
        let options = CombineOptions::new().weights(vec![1.0]);
        let err = zsets
            .union_and_store("a", &["b"], "dest", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::InvalidArgument(_)));
        assert!(recorder.sent().is_empty());
    }

    #[tokio::test]
    async fn test_combine_wire_form() {
        let (recorder, zsets) = recorder_ops(vec![Reply::Int(1)]);
        let options = CombineOptions::new()
            .aggregate(Aggregate::Max)
            .weights([2.0, 0.5]);
        assert_eq!(
            zsets.intersect_and_store("a", &["b"], "dest", &options).await.unwrap(),
            1
        );
        assert_eq!(
            recorder.sent()[0].0,
            "ZINTERSTORE dest 2 a b WEIGHTS 2 0.5 AGGREGATE MAX"
        );
    }

    #[tokio::test]
    async fn test_reverse_score_range_swaps_bounds() {
        let (recorder, zsets) = recorder_ops(vec![Reply::Array(vec![])]);
        zsets
            .reverse_range_by_score_with_scores("k", 1.0, f64::INFINITY, Some(Limit::new(0, 2)))
            .await
            .unwrap();
        assert_eq!(
            recorder.sent()[0].0,
            "ZREVRANGEBYSCORE k +inf 1 WITHSCORES LIMIT 0 2"
        );
    }

    #[tokio::test]
    async fn test_nan_bounds_are_rejected_locally() {
        let (recorder, zsets) = recorder_ops(vec![]);
        assert!(matches!(
            zsets.count("k", f64::NAN, 1.0).await,
            Err(OpsError::InvalidArgument(_))
        ));
        assert!(matches!(
            zsets.add("k", "m", f64::NAN).await,
            Err(OpsError::InvalidArgument(_))
        ));
        assert!(recorder.sent().is_empty());
    }

    #[tokio::test]
    async fn test_lex_range_wire_form() {
        let (recorder, zsets) = recorder_ops(vec![Reply::Array(vec![])]);
        let range = LexRange::new(LexBound::inclusive("a"), LexBound::Unbounded);
        zsets.range_by_lex("k", &range, Some(Limit::new(1, 3))).await.unwrap();
        assert_eq!(recorder.sent()[0].0, "ZRANGEBYLEX k [a + LIMIT 1 3");
    }
}
