//! Record persistence
//!
//! Write contract: create if new. No update, delete or upsert.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use crate::record::{CanonicalRecord, SourceType};
use crate::{Error, Result};

/// Result of [`insert_if_absent`]
///
/// `AlreadyExists` is an expected outcome, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Store `record` unless a record with the same identity key exists
///
/// A single conditional statement: SQLite resolves concurrent inserts of the
/// same `(source_type, record_id)` so exactly one caller sees `Inserted`.
/// An existing row is never overwritten.
pub async fn insert_if_absent(pool: &SqlitePool, record: &CanonicalRecord) -> Result<InsertOutcome> {
    let metrics = serde_json::to_string(&record.engagement_metrics)?;

    let result = sqlx::query(
        r#"
        INSERT INTO records (
            source_type, record_id, channel_id, channel_label, author_id,
            body, created_at, fetched_at, url, engagement_metrics
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_type, record_id) DO NOTHING
        "#,
    )
    .bind(record.source_type.as_str())
    .bind(&record.record_id)
    .bind(&record.channel_id)
    .bind(&record.channel_label)
    .bind(&record.author_id)
    .bind(&record.body)
    .bind(record.created_at.to_rfc3339())
    .bind(record.fetched_at.to_rfc3339())
    .bind(record.url.as_deref())
    .bind(metrics)
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        Ok(InsertOutcome::Inserted)
    } else {
        tracing::debug!(
            source = %record.source_type,
            record_id = %record.record_id,
            "Record already stored"
        );
        Ok(InsertOutcome::AlreadyExists)
    }
}

/// Load a stored record by identity key
pub async fn load_record(
    pool: &SqlitePool,
    source_type: SourceType,
    record_id: &str,
) -> Result<Option<CanonicalRecord>> {
    let row = sqlx::query(
        r#"
        SELECT source_type, record_id, channel_id, channel_label, author_id,
               body, created_at, fetched_at, url, engagement_metrics
        FROM records
        WHERE source_type = ? AND record_id = ?
        "#,
    )
    .bind(source_type.as_str())
    .bind(record_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let source_str: String = row.get("source_type");
    let created_at_str: String = row.get("created_at");
    let fetched_at_str: String = row.get("fetched_at");
    let metrics_str: String = row.get("engagement_metrics");
    let metrics: BTreeMap<String, f64> = serde_json::from_str(&metrics_str)?;

    Ok(Some(CanonicalRecord {
        source_type: source_str.parse()?,
        record_id: row.get("record_id"),
        channel_id: row.get("channel_id"),
        channel_label: row.get("channel_label"),
        author_id: row.get("author_id"),
        body: row.get("body"),
        created_at: parse_timestamp(&created_at_str)?,
        fetched_at: parse_timestamp(&fetched_at_str)?,
        url: row.get("url"),
        engagement_metrics: metrics,
    }))
}

/// Count stored records, optionally for one source type
pub async fn count_records(pool: &SqlitePool, source_type: Option<SourceType>) -> Result<i64> {
    let count: i64 = match source_type {
        Some(source) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE source_type = ?")
                .bind(source.as_str())
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM records")
                .fetch_one(pool)
                .await?
        }
    };
    Ok(count)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Corrupt timestamp '{}': {}", value, e)))
}
