//! Score-ordered member collection

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use serde::{Deserialize, Serialize};

/// `f64` with a total order; NaN never enters a sorted set
#[derive(Debug, Clone, Copy, PartialEq)]
struct Score(f64);

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Members ordered by (score, member bytes)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<(Vec<u8>, f64)>", into = "Vec<(Vec<u8>, f64)>")]
pub struct SortedSet {
    scores: HashMap<Vec<u8>, f64>,
    ordered: BTreeSet<(Score, Vec<u8>)>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Adds or rescores a member. Returns `true` when the member is new.
    pub fn insert(&mut self, member: Vec<u8>, score: f64) -> bool {
        // -0.0 and 0.0 compare equal in the store, keep one representation
        let score = if score == 0.0 { 0.0 } else { score };
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                self.ordered.remove(&(Score(old), member.clone()));
                self.ordered.insert((Score(score), member));
                false
            }
            None => {
                self.ordered.insert((Score(score), member));
                true
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove(member) {
            Some(old) => {
                self.ordered.remove(&(Score(old), member.to_vec()));
                true
            }
            None => false,
        }
    }

    /// Ascending position of a member.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        Some(
            self.ordered
                .range(..(Score(score), member.to_vec()))
                .count(),
        )
    }

    /// Ascending (member, score) pairs.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&[u8], f64)> {
        self.ordered.iter().map(|(s, m)| (m.as_slice(), s.0))
    }

    /// Members whose score lies within the bounds, ascending.
    pub fn score_range(
        &self,
        min: Bound<f64>,
        max: Bound<f64>,
    ) -> impl DoubleEndedIterator<Item = (&[u8], f64)> {
        self.iter().filter(move |(_, s)| {
            let above = match min {
                Bound::Included(v) => *s >= v,
                Bound::Excluded(v) => *s > v,
                Bound::Unbounded => true,
            };
            let below = match max {
                Bound::Included(v) => *s <= v,
                Bound::Excluded(v) => *s < v,
                Bound::Unbounded => true,
            };
            above && below
        })
    }
}

impl From<Vec<(Vec<u8>, f64)>> for SortedSet {
    fn from(pairs: Vec<(Vec<u8>, f64)>) -> Self {
        let mut set = SortedSet::new();
        for (member, score) in pairs {
            set.insert(member, score);
        }
        set
    }
}

impl From<SortedSet> for Vec<(Vec<u8>, f64)> {
    fn from(set: SortedSet) -> Self {
        set.ordered.into_iter().map(|(s, m)| (m, s.0)).collect()
    }
}
