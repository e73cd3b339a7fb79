mod common;

use std::collections::{HashMap, HashSet};

use futures::{StreamExt, TryStreamExt};
use kvtemplate::{JsonCodec, ScanOptions, ValueDto};

use crate::common::test_store::memory_template;

#[tokio::test]
async fn test_fields_entries_and_multi_get() {
    let hashes = memory_template().ops_for_hash();
    hashes.put("user:1", "name", &"ada".to_string()).await.unwrap();
    hashes.put("user:1", "lang", &"rust".to_string()).await.unwrap();

    assert_eq!(
        hashes.fields("user:1").await.unwrap(),
        HashSet::from(["name".to_string(), "lang".to_string()])
    );
    assert_eq!(hashes.size("user:1").await.unwrap(), 2);
    assert_eq!(
        hashes.multi_get("user:1", &["lang", "age", "name"]).await.unwrap(),
        vec![Some("rust".to_string()), None, Some("ada".to_string())]
    );

    let entries = hashes.entries("user:1").await.unwrap();
    assert_eq!(entries.get("name").map(String::as_str), Some("ada"));
    assert_eq!(entries.len(), 2);
    assert_eq!(hashes.field_value_length("user:1", "lang").await.unwrap(), 4);
}

#[tokio::test]
async fn test_missing_hash_reads_are_empty() {
    let hashes = memory_template().ops_for_hash();
    assert_eq!(hashes.get("nope", "f").await.unwrap(), None);
    assert!(hashes.entries("nope").await.unwrap().is_empty());
    assert!(hashes.fields("nope").await.unwrap().is_empty());
    assert!(!hashes.has_field("nope", "f").await.unwrap());
    assert_eq!(hashes.size("nope").await.unwrap(), 0);
}

#[tokio::test]
async fn test_put_if_absent_and_delete_fields() {
    let hashes = memory_template().ops_for_hash();
    assert!(hashes.put_if_absent("h", "f", &"1".to_string()).await.unwrap());
    assert!(!hashes.put_if_absent("h", "f", &"2".to_string()).await.unwrap());
    assert_eq!(hashes.get("h", "f").await.unwrap().as_deref(), Some("1"));

    assert_eq!(hashes.delete_fields("h", &["f", "missing"]).await.unwrap(), 1);
    assert_eq!(hashes.delete_fields("h", &["f"]).await.unwrap(), 0);
    assert!(hashes.entries("h").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scan_yields_every_field_exactly_once() {
    let hashes = memory_template().ops_for_hash();
    let entries: HashMap<String, String> = (0..50)
        .map(|i| (format!("field{}", i), format!("value{}", i)))
        .collect();
    hashes.put_all("big", &entries).await.unwrap();

    let scanned: Vec<(String, String)> = hashes
        .scan("big", ScanOptions::new().count(7))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(scanned.len(), 50);
    let seen: HashMap<String, String> = scanned.into_iter().collect();
    assert_eq!(seen, entries);
}

#[tokio::test]
async fn test_scan_with_pattern_and_early_stop() {
    let hashes = memory_template().ops_for_hash();
    let entries: HashMap<String, String> = ["apple", "apricot", "banana", "avocado"]
        .iter()
        .map(|f| (f.to_string(), "x".to_string()))
        .collect();
    hashes.put_all("fruit", &entries).await.unwrap();

    let mut names: Vec<String> = hashes
        .scan("fruit", ScanOptions::new().pattern("ap*").count(1))
        .map_ok(|(field, _)| field)
        .try_collect()
        .await
        .unwrap();
    names.sort();
    assert_eq!(names, vec!["apple".to_string(), "apricot".to_string()]);

    let first: Vec<_> = hashes.scan("fruit", ScanOptions::new()).take(1).collect().await;
    assert_eq!(first.len(), 1);
    assert!(first[0].is_ok());

    let none: Vec<_> = hashes.scan("nope", ScanOptions::new()).collect().await;
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_json_values_and_increments() {
    let template = memory_template();
    let docs = template.ops_for_hash_with(JsonCodec::<ValueDto>::default());
    docs.put("docs", "one", &ValueDto::new("a", "b")).await.unwrap();
    assert_eq!(
        docs.values("docs").await.unwrap(),
        vec![ValueDto::new("a", "b")]
    );

    let counters = template.ops_for_hash();
    assert_eq!(counters.increment("stats", "hits", 3i64).await.unwrap(), 3);
    assert_eq!(counters.increment("stats", "hits", -1i64).await.unwrap(), 2);
    assert_eq!(counters.increment("stats", "ratio", 0.25).await.unwrap(), 0.25);
    assert!(counters.has_field("stats", "ratio").await.unwrap());
}
