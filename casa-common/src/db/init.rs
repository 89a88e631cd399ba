//! Database initialization
//!
//! Opening the store is the point where an unreachable database becomes a
//! fatal error; after this every write is a per-record outcome.

use crate::config::StoreConfig;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Open (creating if needed) the store at `db_path` and ensure the schema exists
pub async fn open_store(db_path: &Path, options: &StoreConfig) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // WAL lets the forum run and the chat workers write while readers proceed
    let connect_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(options.busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections.max(1))
        .connect_with(connect_options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_records_table(pool).await?;
    Ok(())
}

/// Create the records table
///
/// The composite primary key is the identity key; the conditional insert
/// relies on it.
pub async fn create_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            source_type TEXT NOT NULL,
            record_id TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            channel_label TEXT NOT NULL,
            author_id TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            fetched_at TEXT NOT NULL,
            url TEXT,
            engagement_metrics TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (source_type, record_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_channel ON records(source_type, channel_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
