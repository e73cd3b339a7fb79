mod common;

use std::collections::HashSet;

use kvtemplate::OpsError;

use crate::common::test_store::{TcpFixture, memory_template};

fn strings(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_union_and_store_reports_union_size() {
    let sets = memory_template().ops_for_set();
    sets.add_all("a", &["1", "2", "3"]).await.unwrap();
    sets.add_all("b", &["3", "4"]).await.unwrap();

    let union = sets.union("a", &["b"]).await.unwrap();
    let stored = sets.union_and_store("a", &["b"], "dest").await.unwrap();
    assert_eq!(stored, union.len() as u64);
    assert_eq!(sets.members("dest").await.unwrap(), union);
}

#[tokio::test]
async fn test_store_overwrites_destination() {
    let sets = memory_template().ops_for_set();
    sets.add_all("dest", &["stale"]).await.unwrap();
    sets.add_all("a", &["x", "y"]).await.unwrap();
    sets.add_all("b", &["y", "z"]).await.unwrap();

    assert_eq!(sets.intersect_and_store("a", &["b"], "dest").await.unwrap(), 1);
    assert_eq!(sets.members("dest").await.unwrap(), strings(&["y"]));

    assert_eq!(sets.difference_and_store("a", &["a"], "dest").await.unwrap(), 0);
    assert!(sets.members("dest").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_set_reads_are_empty() {
    let sets = memory_template().ops_for_set();
    assert!(sets.members("nope").await.unwrap().is_empty());
    assert_eq!(sets.size("nope").await.unwrap(), 0);
    assert!(!sets.is_member("nope", "x").await.unwrap());
    assert_eq!(sets.random_member("nope").await.unwrap(), None);
    assert!(sets.union("nope", &["also-nope"]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_and_remove_count_changes() {
    let sets = memory_template().ops_for_set();
    assert!(sets.add("s", "a").await.unwrap());
    assert!(!sets.add("s", "a").await.unwrap());
    assert_eq!(sets.add_all("s", &["a", "b", "c"]).await.unwrap(), 2);
    assert_eq!(sets.remove("s", &["a", "zzz"]).await.unwrap(), 1);
    assert_eq!(sets.members("s").await.unwrap(), strings(&["b", "c"]));

    let member = sets.random_member("s").await.unwrap().unwrap();
    assert!(["b", "c"].contains(&member.as_str()));
    assert_eq!(sets.size("s").await.unwrap(), 2);
}

#[tokio::test]
async fn test_pop_count_larger_than_any_set() {
    let sets = memory_template().ops_for_set();
    sets.add_all("s", &["a", "b", "c"]).await.unwrap();
    let popped: HashSet<String> = sets
        .pop_count("s", i64::MAX as u64)
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(popped, strings(&["a", "b", "c"]));
    assert_eq!(sets.size("s").await.unwrap(), 0);
    assert!(sets.pop_count("s", i64::MAX as u64).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_set_ops_over_tcp() {
    let fixture = TcpFixture::start().await;
    let sets = fixture.template.ops_for_set();
    sets.add_all("a", &["1", "2"]).await.unwrap();
    sets.add_all("b", &["2", "3"]).await.unwrap();
    assert_eq!(sets.difference("a", &["b"]).await.unwrap(), strings(&["1"]));

    fixture.template.ops_for_list().push_left("list", "x").await.unwrap();
    assert!(matches!(
        sets.members("list").await,
        Err(OpsError::TypeMismatch(_))
    ));
}
