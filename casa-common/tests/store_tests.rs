//! Integration tests for the dedup store
//!
//! Exercises the on-disk store the way the collectors use it: one shared
//! database file, many concurrent writers.

use std::sync::Arc;

use casa_common::config::{database_path, StoreConfig};
use casa_common::db::{count_records, insert_if_absent, load_record, open_store, InsertOutcome};
use casa_common::record::{ForumPostDraft, BODY_CHAR_CAP};
use casa_common::{CanonicalRecord, SourceType};
use chrono::Utc;
use tempfile::TempDir;
use tokio::task::JoinSet;

fn forum_record(post_id: &str) -> CanonicalRecord {
    CanonicalRecord::from_forum_post(
        ForumPostDraft {
            channel_id: "milano".to_string(),
            post_id: post_id.to_string(),
            channel_label: Some("milano".to_string()),
            author: Some("someone".to_string()),
            title: Some("Cerco stanza".to_string()),
            created_utc: Some(1_700_000_000.0),
            ..Default::default()
        },
        Utc::now(),
    )
}

#[tokio::test]
async fn test_open_store_creates_database_and_parent_folder() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = database_path(&temp_dir.path().join("nested").join("root"));

    let pool = open_store(&db_path, &StoreConfig::default()).await.unwrap();

    assert!(db_path.exists());
    assert_eq!(count_records(&pool, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reopening_store_keeps_records() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = database_path(temp_dir.path());

    // Step 1: First process stores a record
    {
        let pool = open_store(&db_path, &StoreConfig::default()).await.unwrap();
        insert_if_absent(&pool, &forum_record("t3_keep")).await.unwrap();
        pool.close().await;
    }

    // Step 2: A later invocation sees it as a duplicate
    let pool = open_store(&db_path, &StoreConfig::default()).await.unwrap();
    let outcome = insert_if_absent(&pool, &forum_record("t3_keep")).await.unwrap();
    assert_eq!(outcome, InsertOutcome::AlreadyExists);
}

#[tokio::test]
async fn test_concurrent_identical_inserts_yield_one_winner() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = database_path(temp_dir.path());
    let pool = Arc::new(open_store(&db_path, &StoreConfig::default()).await.unwrap());

    // Spawn 16 concurrent writers of the same identity key
    let mut join_set = JoinSet::new();
    for _ in 0..16 {
        let pool_clone = Arc::clone(&pool);
        join_set.spawn(async move {
            insert_if_absent(&pool_clone, &forum_record("t3_race"))
                .await
                .expect("insert failed")
        });
    }

    let mut inserted = 0;
    let mut already_exists = 0;
    while let Some(result) = join_set.join_next().await {
        match result.expect("Task panicked") {
            InsertOutcome::Inserted => inserted += 1,
            InsertOutcome::AlreadyExists => already_exists += 1,
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(already_exists, 15);
    assert_eq!(count_records(&pool, Some(SourceType::PullForum)).await.unwrap(), 1);
}

#[tokio::test]
async fn test_two_concurrent_inserts_never_both_win() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = database_path(temp_dir.path());
    let pool = open_store(&db_path, &StoreConfig::default()).await.unwrap();

    let record = forum_record("t3_pair");
    let (a, b) = tokio::join!(
        insert_if_absent(&pool, &record),
        insert_if_absent(&pool, &record)
    );

    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| matches!(o, InsertOutcome::AlreadyExists));
    assert_eq!(outcomes, vec![InsertOutcome::Inserted, InsertOutcome::AlreadyExists]);
}

#[tokio::test]
async fn test_long_body_is_stored_truncated() {
    let temp_dir = TempDir::new().unwrap();
    let pool = open_store(&database_path(temp_dir.path()), &StoreConfig::default())
        .await
        .unwrap();

    let record = CanonicalRecord::from_forum_post(
        ForumPostDraft {
            channel_id: "milano".to_string(),
            post_id: "t3_long".to_string(),
            title: Some("a".repeat(5000)),
            ..Default::default()
        },
        Utc::now(),
    );
    insert_if_absent(&pool, &record).await.unwrap();

    let stored = load_record(&pool, SourceType::PullForum, "t3_long")
        .await
        .unwrap()
        .expect("record should be stored");
    assert_eq!(stored.body.chars().count(), BODY_CHAR_CAP);
}
