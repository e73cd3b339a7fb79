//! Keyspace of the in-memory store

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::zset::SortedSet;
use crate::error::TransportError;

/// Errors reported to the client, worded like the store's own replies
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("ERR no such key")]
    NoSuchKey,
    #[error("ERR index out of range")]
    IndexOutOfRange,
    #[error("ERR value is not an integer or out of range")]
    NotInteger,
    #[error("ERR value is not a valid float")]
    NotFloat,
    #[error("ERR min or max is not a float")]
    BadScoreRange,
    #[error("ERR min or max not valid string range item")]
    BadLexRange,
    #[error("ERR syntax error")]
    Syntax,
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),
    #[error("ERR {0}")]
    InvalidArgument(String),
}

impl From<StoreError> for TransportError {
    fn from(err: StoreError) -> Self {
        TransportError::from_server_message(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RedisValue {
    String(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Hash(HashMap<Vec<u8>, Vec<u8>>),
    Set(HashSet<Vec<u8>>),
    ZSet(SortedSet),
}

impl RedisValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            RedisValue::String(_) => "string",
            RedisValue::List(_) => "list",
            RedisValue::Hash(_) => "hash",
            RedisValue::Set(_) => "set",
            RedisValue::ZSet(_) => "zset",
        }
    }

    fn is_empty_collection(&self) -> bool {
        match self {
            RedisValue::String(_) => false,
            RedisValue::List(l) => l.is_empty(),
            RedisValue::Hash(h) => h.is_empty(),
            RedisValue::Set(s) => s.is_empty(),
            RedisValue::ZSet(z) => z.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub value: RedisValue,
    pub expire_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: RedisValue) -> Self {
        Self {
            value,
            expire_at: None,
        }
    }

    pub fn with_ttl(value: RedisValue, ttl: Duration) -> Self {
        Self {
            value,
            expire_at: Some(Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expire_at.is_some_and(|t| Instant::now() >= t)
    }

    /// Remaining lifetime in milliseconds, -1 without expiry
    pub fn ttl_millis(&self) -> i64 {
        match self.expire_at {
            Some(t) => t.saturating_duration_since(Instant::now()).as_millis() as i64,
            None => -1,
        }
    }
}

/// Flat key -> value map with lazy expiry
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: HashMap<Vec<u8>, Entry>,
}

macro_rules! typed_access {
    ($get:ident, $get_mut:ident, $get_or_create:ident, $variant:ident, $ty:ty) => {
        pub fn $get(&mut self, key: &[u8]) -> StoreResult<Option<&$ty>> {
            match self.entry(key) {
                Some(Entry { value: RedisValue::$variant(v), .. }) => Ok(Some(v)),
                Some(_) => Err(StoreError::WrongType),
                None => Ok(None),
            }
        }

        pub fn $get_mut(&mut self, key: &[u8]) -> StoreResult<Option<&mut $ty>> {
            match self.entry_mut(key) {
                Some(Entry { value: RedisValue::$variant(v), .. }) => Ok(Some(v)),
                Some(_) => Err(StoreError::WrongType),
                None => Ok(None),
            }
        }

        pub fn $get_or_create(&mut self, key: &[u8]) -> StoreResult<&mut $ty> {
            self.purge_if_expired(key);
            let entry = self
                .entries
                .entry(key.to_vec())
                .or_insert_with(|| Entry::new(RedisValue::$variant(Default::default())));
            match &mut entry.value {
                RedisValue::$variant(v) => Ok(v),
                _ => Err(StoreError::WrongType),
            }
        }
    };
}

impl Keyspace {
    fn purge_if_expired(&mut self, key: &[u8]) {
        if self.entries.get(key).is_some_and(Entry::is_expired) {
            self.entries.remove(key);
        }
    }

    pub fn entry(&mut self, key: &[u8]) -> Option<&Entry> {
        self.purge_if_expired(key);
        self.entries.get(key)
    }

    pub fn entry_mut(&mut self, key: &[u8]) -> Option<&mut Entry> {
        self.purge_if_expired(key);
        self.entries.get_mut(key)
    }

    pub fn insert(&mut self, key: Vec<u8>, entry: Entry) {
        self.entries.insert(key, entry);
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        self.purge_if_expired(key);
        self.entries.remove(key)
    }

    pub fn exists(&mut self, key: &[u8]) -> bool {
        self.entry(key).is_some()
    }

    /// Collections that became empty cease to exist.
    pub fn drop_if_empty(&mut self, key: &[u8]) {
        if self
            .entries
            .get(key)
            .is_some_and(|e| e.value.is_empty_collection())
        {
            self.entries.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| !e.is_expired()).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn live_entries(&self) -> impl Iterator<Item = (&Vec<u8>, &Entry)> {
        self.entries.iter().filter(|(_, e)| !e.is_expired())
    }

    typed_access!(string, string_mut, string_or_create, String, Vec<u8>);
    typed_access!(list, list_mut, list_or_create, List, VecDeque<Vec<u8>>);
    typed_access!(hash, hash_mut, hash_or_create, Hash, HashMap<Vec<u8>, Vec<u8>>);
    typed_access!(set, set_mut, set_or_create, Set, HashSet<Vec<u8>>);
    typed_access!(zset, zset_mut, zset_or_create, ZSet, SortedSet);

    /// Checks a key is absent or of the given type without touching it.
    pub fn check_type(&mut self, key: &[u8], type_name: &str) -> StoreResult<()> {
        match self.entry(key) {
            Some(e) if e.value.type_name() != type_name => Err(StoreError::WrongType),
            _ => Ok(()),
        }
    }
}

/// Glob match as used by MATCH options: `*`, `?`, `[a-z]`, `[^x]`, `\` escapes.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|i| glob_match(rest, &text[i..])),
        Some((b'?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((b'[', rest)) => {
            let Some((&c, text_rest)) = text.split_first() else {
                return false;
            };
            let (negate, mut class) = match rest.split_first() {
                Some((b'^', r)) => (true, r),
                _ => (false, rest),
            };
            let mut matched = false;
            loop {
                match class {
                    [] => return false,
                    [b']', tail @ ..] => {
                        class = tail;
                        break;
                    }
                    [b'\\', esc, tail @ ..] => {
                        matched |= *esc == c;
                        class = tail;
                    }
                    [lo, b'-', hi, tail @ ..] if *hi != b']' => {
                        let (lo, hi) = if lo <= hi { (*lo, *hi) } else { (*hi, *lo) };
                        matched |= (lo..=hi).contains(&c);
                        class = tail;
                    }
                    [ch, tail @ ..] => {
                        matched |= *ch == c;
                        class = tail;
                    }
                }
            }
            matched != negate && glob_match(class, text_rest)
        }
        Some((b'\\', rest)) if !rest.is_empty() => {
            text.first() == rest.first() && glob_match(&rest[1..], &text[1..])
        }
        Some((ch, rest)) => text.first() == Some(ch) && glob_match(rest, &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_type_is_reported() {
        let mut ks = Keyspace::default();
        ks.insert(b"k".to_vec(), Entry::new(RedisValue::String(b"v".to_vec())));
        assert_eq!(ks.list(b"k").unwrap_err(), StoreError::WrongType);
        assert_eq!(ks.hash_or_create(b"k").unwrap_err(), StoreError::WrongType);
        assert_eq!(ks.string(b"k").unwrap(), Some(&b"v".to_vec()));
    }

    #[test]
    fn test_expired_entries_vanish() {
        let mut ks = Keyspace::default();
        ks.insert(
            b"k".to_vec(),
            Entry::with_ttl(RedisValue::String(b"v".to_vec()), Duration::ZERO),
        );
        assert!(!ks.exists(b"k"));
        assert_eq!(ks.len(), 0);
    }

    #[test]
    fn test_drop_if_empty() {
        let mut ks = Keyspace::default();
        ks.list_or_create(b"l").unwrap().push_back(b"a".to_vec());
        ks.list_mut(b"l").unwrap().unwrap().pop_back();
        ks.drop_if_empty(b"l");
        assert!(!ks.exists(b"l"));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"*", b""));
        assert!(glob_match(b"user:*", b"user:42"));
        assert!(!glob_match(b"user:*", b"admin:1"));
        assert!(glob_match(b"f?eld", b"field"));
        assert!(glob_match(b"h[ae]llo", b"hallo"));
        assert!(!glob_match(b"h[^e]llo", b"hello"));
        assert!(glob_match(b"v[0-9]", b"v7"));
        assert!(glob_match(b"a\\*b", b"a*b"));
        assert!(!glob_match(b"a\\*b", b"axb"));
    }
}
