mod common;

use std::time::Duration;

use kvtemplate::{
    AbsentFieldMode, CodecConfig, DateTimeMode, JsonCodec, OpsError, Timestamp, ValueCodec, ValueDto,
};
use serde::{Deserialize, Serialize};

use crate::common::test_store::memory_template;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Release {
    name: String,
    shipped_at: Timestamp,
    #[serde(skip_serializing_if = "kvtemplate::codec::omit_absent")]
    notes: Option<String>,
}

#[tokio::test]
async fn test_record_round_trips_through_store() {
    let template = memory_template();
    let ops = template.ops_for_value_with(JsonCodec::<ValueDto>::default());

    let dto = ValueDto::new("alpha", "beta");
    ops.set("dto:1", &dto).await.unwrap();
    assert_eq!(ops.get("dto:1").await.unwrap(), Some(dto.clone()));

    let raw = template.ops_for_value().get("dto:1").await.unwrap().unwrap();
    assert_eq!(raw, r#"{"firstExampleValue":"alpha","secondExampleValue":"beta"}"#);
}

#[tokio::test]
async fn test_identically_configured_codecs_store_identical_bytes() {
    let template = memory_template();
    let config = CodecConfig {
        date_time: DateTimeMode::Timestamp,
        absent_fields: AbsentFieldMode::Null,
    };
    let release = Release {
        name: "1.0".to_string(),
        shipped_at: Timestamp::from_millis(1_600_000_000_000).unwrap(),
        notes: None,
    };

    template
        .ops_for_value_with(JsonCodec::<Release>::new(config))
        .set("a", &release)
        .await
        .unwrap();
    template
        .ops_for_value_with(JsonCodec::<Release>::new(config))
        .set("b", &release)
        .await
        .unwrap();

    let raw = template.ops_for_value();
    let a = raw.get("a").await.unwrap().unwrap();
    assert_eq!(a, raw.get("b").await.unwrap().unwrap());
    assert_eq!(a, r#"{"name":"1.0","notes":null,"shipped_at":1600000000000}"#);

    let decoded = JsonCodec::<Release>::new(config).decode(a.as_bytes()).unwrap();
    assert_eq!(decoded, release);
}

#[tokio::test]
async fn test_missing_key_reads_are_absent() {
    let ops = memory_template().ops_for_value();
    assert_eq!(ops.get("nope").await.unwrap(), None);
    assert_eq!(ops.get_and_set("nope", &"first".to_string()).await.unwrap(), None);
    assert_eq!(
        ops.get_and_set("nope", &"second".to_string()).await.unwrap().as_deref(),
        Some("first")
    );
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let ops = memory_template().ops_for_value();
    ops.set("k", &"v".to_string()).await.unwrap();
    assert!(ops.delete("k").await.unwrap());
    assert!(!ops.delete("k").await.unwrap());
    assert_eq!(ops.delete_many(&["k", "other"]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_multi_get_aligns_with_requested_keys() {
    let ops = memory_template().ops_for_value();
    ops.multi_set(&[("a", "1".to_string()), ("c", "3".to_string())])
        .await
        .unwrap();
    assert_eq!(
        ops.multi_get(&["a", "b", "c"]).await.unwrap(),
        vec![Some("1".to_string()), None, Some("3".to_string())]
    );
    assert_eq!(ops.delete_many(&["a", "b", "c"]).await.unwrap(), 2);
}

#[tokio::test]
async fn test_set_if_absent_and_ttl() {
    let ops = memory_template().ops_for_value();
    assert!(ops.set_if_absent("lock", &"me".to_string()).await.unwrap());
    assert!(!ops.set_if_absent("lock", &"you".to_string()).await.unwrap());
    assert_eq!(ops.get("lock").await.unwrap().as_deref(), Some("me"));

    ops.set_with_ttl("session", &"s".to_string(), Duration::from_millis(50))
        .await
        .unwrap();
    assert!(ops.get("session").await.unwrap().is_some());
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(ops.get("session").await.unwrap(), None);
}

#[tokio::test]
async fn test_increment_keeps_delta_type() {
    let ops = memory_template().ops_for_value();
    let n: i64 = ops.increment("counter", 10).await.unwrap();
    assert_eq!(n, 10);
    let f: f64 = ops.increment("counter", 0.5).await.unwrap();
    assert_eq!(f, 10.5);

    ops.set("word", &"abc".to_string()).await.unwrap();
    assert!(matches!(
        ops.increment("word", 1i64).await,
        Err(OpsError::Transport(_))
    ));
}

#[tokio::test]
async fn test_wrong_type_is_reported_verbatim() {
    let template = memory_template();
    template.ops_for_list().push_left("list", "x").await.unwrap();
    match template.ops_for_value().get("list").await {
        Err(OpsError::TypeMismatch(msg)) => assert!(msg.starts_with("WRONGTYPE")),
        other => panic!("expected type mismatch, got {:?}", other),
    }
}
