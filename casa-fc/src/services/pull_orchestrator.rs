//! Pull run orchestrator
//!
//! One invocation walks the configured channels in order: politeness gate,
//! fetch, filter, insert-if-absent. A failing channel is logged and counted
//! and the run moves on. The orchestrator keeps no state between runs;
//! overlapping runs are safe because the store deduplicates.

use casa_common::db::{insert_if_absent, InsertOutcome};
use casa_common::ChannelFilter;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::fmt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ChannelError;
use crate::services::forum_client::{FetchOutcome, PullSource};
use crate::services::politeness::{GateOutcome, PolitenessGate};

/// Aggregate result of one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Channels attempted, including skipped and failed ones
    pub channels_processed: usize,
    /// Channels the upstream reported as not found
    pub channels_skipped: usize,
    pub channel_errors: usize,
    pub records_inserted: usize,
    pub records_duplicate: usize,
    /// Records from channels outside the allow-list
    pub records_filtered: usize,
    /// Listing items that could not be mapped
    pub records_malformed: usize,
    /// Run stopped early on request
    pub cancelled: bool,
}

impl RunSummary {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            ended_at: now,
            channels_processed: 0,
            channels_skipped: 0,
            channel_errors: 0,
            records_inserted: 0,
            records_duplicate: 0,
            records_filtered: 0,
            records_malformed: 0,
            cancelled: false,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}{}", self.run_id, if self.cancelled { " (cancelled)" } else { "" })?;
        writeln!(
            f,
            "  channels: {} processed, {} not found, {} failed",
            self.channels_processed, self.channels_skipped, self.channel_errors
        )?;
        writeln!(
            f,
            "  records:  {} inserted, {} duplicate, {} filtered, {} malformed",
            self.records_inserted, self.records_duplicate, self.records_filtered, self.records_malformed
        )?;
        write!(
            f,
            "  elapsed:  {} ms",
            (self.ended_at - self.started_at).num_milliseconds()
        )
    }
}

/// Drives one pull source over a fixed channel list
pub struct PullOrchestrator<S: PullSource> {
    source: S,
    pool: SqlitePool,
    channels: Vec<String>,
    batch_size: u32,
    filter: ChannelFilter,
    gate: PolitenessGate,
}

impl<S: PullSource> PullOrchestrator<S> {
    pub fn new(
        source: S,
        pool: SqlitePool,
        channels: Vec<String>,
        batch_size: u32,
        filter: ChannelFilter,
        gate: PolitenessGate,
    ) -> Self {
        Self {
            source,
            pool,
            channels,
            batch_size,
            filter,
            gate,
        }
    }

    /// Run once over all channels
    ///
    /// Cancellation is honoured between channels only; a channel that has
    /// started always finishes.
    pub async fn run(&self, cancel: &CancellationToken) -> RunSummary {
        let mut summary = RunSummary::new();

        tracing::info!(
            run_id = %summary.run_id,
            channels = self.channels.len(),
            batch_size = self.batch_size,
            "Starting forum run"
        );

        for channel in &self.channels {
            if self.gate.wait(cancel).await == GateOutcome::Cancelled {
                summary.cancelled = true;
                tracing::info!(
                    run_id = %summary.run_id,
                    remaining = self.channels.len() - summary.channels_processed,
                    "Run cancelled, skipping remaining channels"
                );
                break;
            }

            summary.channels_processed += 1;

            if let Err(e) = self.process_channel(channel, &mut summary).await {
                summary.channel_errors += 1;
                tracing::warn!(
                    run_id = %summary.run_id,
                    channel = %channel,
                    error = %e,
                    "Channel failed"
                );
            }
        }

        summary.ended_at = Utc::now();

        tracing::info!(
            run_id = %summary.run_id,
            channels_processed = summary.channels_processed,
            channels_skipped = summary.channels_skipped,
            channel_errors = summary.channel_errors,
            records_inserted = summary.records_inserted,
            records_duplicate = summary.records_duplicate,
            records_filtered = summary.records_filtered,
            records_malformed = summary.records_malformed,
            cancelled = summary.cancelled,
            "Forum run complete"
        );

        summary
    }

    async fn process_channel(&self, channel: &str, summary: &mut RunSummary) -> Result<(), ChannelError> {
        let batch = match self.source.fetch_batch(channel, self.batch_size).await? {
            FetchOutcome::Fetched(batch) => batch,
            FetchOutcome::ChannelNotFound => {
                summary.channels_skipped += 1;
                tracing::info!(run_id = %summary.run_id, channel = %channel, "Channel not found, skipped");
                return Ok(());
            }
        };

        summary.records_malformed += batch.malformed;

        let mut inserted = 0;
        for record in batch.records {
            if !self.filter.is_monitored(&record.channel_label) {
                summary.records_filtered += 1;
                continue;
            }

            match insert_if_absent(&self.pool, &record).await? {
                InsertOutcome::Inserted => {
                    inserted += 1;
                    summary.records_inserted += 1;
                }
                InsertOutcome::AlreadyExists => summary.records_duplicate += 1,
            }
        }

        tracing::debug!(run_id = %summary.run_id, channel = %channel, inserted, "Channel done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_display_mentions_counts() {
        let mut summary = RunSummary::new();
        summary.channels_processed = 3;
        summary.channel_errors = 1;
        summary.records_inserted = 12;

        let text = summary.to_string();
        assert!(text.contains("3 processed"));
        assert!(text.contains("1 failed"));
        assert!(text.contains("12 inserted"));
        assert!(!text.contains("cancelled"));
    }
}
