//! Encoding of application values into stored strings
//!
//! `StringCodec` stores strings as-is. `JsonCodec<T>` stores any serde type
//! as JSON under a fixed `CodecConfig`. Object keys are emitted sorted, so two
//! codecs with the same config produce byte-identical output for equal values.
//!
//! Optional record fields opt into `AbsentFieldMode` with
//! `#[serde(skip_serializing_if = "omit_absent")]`. Nulls anywhere else (map
//! values, raw JSON values) are written as-is.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::de::{self, DeserializeOwned, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CodecError;

/// Converts between a typed value and its stored bytes
pub trait ValueCodec: Send + Sync {
    type Item;

    fn encode(&self, item: &Self::Item) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Item, CodecError>;
}

/// Plain UTF-8 strings
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl ValueCodec for StringCodec {
    type Item = String;

    fn encode(&self, item: &String) -> Result<Vec<u8>, CodecError> {
        Ok(item.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, CodecError> {
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

/// How `Timestamp` fields are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateTimeMode {
    /// RFC 3339, millisecond precision, `Z` suffix
    #[default]
    Textual,
    /// Milliseconds since the Unix epoch
    Timestamp,
}

/// How `None` fields are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentFieldMode {
    #[default]
    Omit,
    Null,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    pub date_time: DateTimeMode,
    pub absent_fields: AbsentFieldMode,
}

/// JSON codec for one record type
pub struct JsonCodec<T> {
    config: CodecConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            config,
            _marker: PhantomData,
        }
    }

    pub fn config(&self) -> CodecConfig {
        self.config
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new(self.config)
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec").field("config", &self.config).finish()
    }
}

impl<T> ValueCodec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Item = T;

    fn encode(&self, item: &T) -> Result<Vec<u8>, CodecError> {
        // through `Value` so object keys come out sorted
        let value =
            with_config(self.config, || serde_json::to_value(item)).map_err(CodecError::Encode)?;
        serde_json::to_vec(&value).map_err(CodecError::Encode)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }
}

thread_local! {
    // Serialization is synchronous, so the config only needs to live for one call.
    static ACTIVE_CONFIG: Cell<CodecConfig> = const {
        Cell::new(CodecConfig {
            date_time: DateTimeMode::Textual,
            absent_fields: AbsentFieldMode::Omit,
        })
    };
}

fn with_config<R>(config: CodecConfig, f: impl FnOnce() -> R) -> R {
    let previous = ACTIVE_CONFIG.with(|c| c.replace(config));
    let result = f();
    ACTIVE_CONFIG.with(|c| c.set(previous));
    result
}

/// `skip_serializing_if` predicate for optional record fields.
///
/// Skips `None` under `AbsentFieldMode::Omit`, keeps it as `null` under
/// `AbsentFieldMode::Null`. Outside a `JsonCodec` encode it behaves as `Omit`.
pub fn omit_absent<T>(value: &Option<T>) -> bool {
    value.is_none() && ACTIVE_CONFIG.with(Cell::get).absent_fields == AbsentFieldMode::Omit
}

/// UTC instant stored with millisecond precision
///
/// Its encoding follows the `DateTimeMode` of the codec doing the encoding;
/// decoding accepts either form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Truncates to whole milliseconds so the value survives a round trip.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self::from_millis(at.timestamp_millis()).unwrap_or(Self(at))
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match ACTIVE_CONFIG.with(Cell::get).date_time {
            DateTimeMode::Textual => serializer
                .serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true)),
            DateTimeMode::Timestamp => serializer.serialize_i64(self.millis()),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimestampVisitor;

        impl Visitor<'_> for TimestampVisitor {
            type Value = Timestamp;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an RFC 3339 string or epoch milliseconds")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
                Timestamp::from_millis(v).ok_or_else(|| E::custom("timestamp out of range"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
                let v = i64::try_from(v).map_err(|_| E::custom("timestamp out of range"))?;
                self.visit_i64(v)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Timestamp, E> {
                DateTime::parse_from_rfc3339(v)
                    .map(|dt| Timestamp::new(dt.with_timezone(&Utc)))
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}
