//! Ingestion pipeline failure handling: store errors and a saturated queue

use std::sync::Arc;

use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::task::JoinSet;

use casa_cc::pipeline::{spawn_pipeline, Screening};
use casa_cc::{IngestStats, InboundMessage};
use casa_common::config::{database_path, StoreConfig};
use casa_common::db::{count_records, load_record, open_store};
use casa_common::{ChannelFilter, SourceType};

async fn temp_store(temp_dir: &TempDir) -> SqlitePool {
    open_store(&database_path(temp_dir.path()), &StoreConfig::default())
        .await
        .unwrap()
}

fn housing_message(id: &str) -> InboundMessage {
    InboundMessage {
        message_id: id.to_string(),
        chat_id: "120363@g.us".to_string(),
        chat_name: Some("Milan Housing Group".to_string()),
        is_group: true,
        body: Some(format!("Stanza singola disponibile, annuncio {}", id)),
        timestamp: Some(1_700_000_000),
        ..Default::default()
    }
}

async fn join_all(mut workers: JoinSet<()>) {
    while let Some(result) = workers.join_next().await {
        result.unwrap();
    }
}

#[tokio::test]
async fn test_store_error_costs_only_that_message() {
    let temp_dir = TempDir::new().unwrap();
    let pool = temp_store(&temp_dir).await;

    // The store rejects exactly one record id
    sqlx::query(
        "CREATE TRIGGER reject_one BEFORE INSERT ON records \
         WHEN NEW.record_id = 'rejected' \
         BEGIN SELECT RAISE(ABORT, 'write rejected'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let stats = Arc::new(IngestStats::default());
    let (pipeline, workers) = spawn_pipeline(pool.clone(), ChannelFilter::allow_all(), 10, 16, 1, Arc::clone(&stats));

    assert_eq!(pipeline.submit(housing_message("rejected")), Screening::Accepted);
    assert_eq!(pipeline.submit(housing_message("after")), Screening::Accepted);

    drop(pipeline);
    join_all(workers).await;

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.inserted, 1);
    assert!(load_record(&pool, SourceType::PushChat, "after").await.unwrap().is_some());
    assert!(load_record(&pool, SourceType::PushChat, "rejected").await.unwrap().is_none());
}

// `#[tokio::test]` runs on a current-thread runtime: the worker cannot take
// anything off the queue until the test yields, so it is stalled during the
// submits below.
#[tokio::test]
async fn test_full_queue_drops_without_blocking() {
    let temp_dir = TempDir::new().unwrap();
    let pool = temp_store(&temp_dir).await;

    let stats = Arc::new(IngestStats::default());
    let (pipeline, workers) = spawn_pipeline(pool.clone(), ChannelFilter::allow_all(), 10, 1, 1, Arc::clone(&stats));

    for id in ["q1", "q2", "q3"] {
        pipeline.submit(housing_message(id));
    }

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.received, 3);
    assert_eq!(snapshot.dropped, 2);

    drop(pipeline);
    join_all(workers).await;

    assert_eq!(stats.snapshot().inserted, 1);
    assert_eq!(count_records(&pool, Some(SourceType::PushChat)).await.unwrap(), 1);
    assert!(load_record(&pool, SourceType::PushChat, "q1").await.unwrap().is_some());
}
