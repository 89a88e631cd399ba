//! Inbound message pipeline
//!
//! The session loop screens each message cheaply (group-only, minimum length)
//! and hands survivors to a bounded queue. Workers take messages off the
//! queue and run allow-list filter → map → insert-if-absent. Each message is
//! an independent unit of work; the store is the only shared state.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use casa_common::db::{insert_if_absent, InsertOutcome};
use casa_common::record::ChatMessageDraft;
use casa_common::{CanonicalRecord, ChannelFilter};
use chrono::Utc;
use futures::FutureExt;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::provider::InboundMessage;

/// Outcome of the cheap checks done at the delivery boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screening {
    Accepted,
    /// Direct (1:1) conversation
    NotGroup,
    /// Reaction, sticker or otherwise near-empty content
    TooShort,
}

/// Cheap pre-mapping rejection; never touches the store
pub fn screen(message: &InboundMessage, min_body_chars: usize) -> Screening {
    if !message.is_group {
        return Screening::NotGroup;
    }
    let length = message
        .body
        .as_deref()
        .map(|body| body.trim().chars().count())
        .unwrap_or(0);
    if length < min_body_chars {
        return Screening::TooShort;
    }
    Screening::Accepted
}

/// Running ingestion counters, shared by the session loop and workers
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    not_group: AtomicU64,
    too_short: AtomicU64,
    dropped: AtomicU64,
    filtered: AtomicU64,
    inserted: AtomicU64,
    duplicate: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSnapshot {
    pub received: u64,
    pub not_group: u64,
    pub too_short: u64,
    /// Accepted but lost because the queue was full or closed
    pub dropped: u64,
    pub filtered: u64,
    pub inserted: u64,
    pub duplicate: u64,
    pub failed: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            received: self.received.load(Ordering::Relaxed),
            not_group: self.not_group.load(Ordering::Relaxed),
            too_short: self.too_short.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for IngestSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received {}, inserted {}, duplicate {}, filtered {}, not group {}, too short {}, dropped {}, failed {}",
            self.received,
            self.inserted,
            self.duplicate,
            self.filtered,
            self.not_group,
            self.too_short,
            self.dropped,
            self.failed
        )
    }
}

/// Delivery-side handle: screens and enqueues messages
pub struct EventPipeline {
    tx: mpsc::Sender<InboundMessage>,
    min_body_chars: usize,
    stats: Arc<IngestStats>,
}

impl EventPipeline {
    /// Screen `message` and queue it for the workers
    ///
    /// Never waits for queue space: a full queue drops the message.
    pub fn submit(&self, message: InboundMessage) -> Screening {
        IngestStats::bump(&self.stats.received);

        let screening = screen(&message, self.min_body_chars);
        match screening {
            Screening::NotGroup => IngestStats::bump(&self.stats.not_group),
            Screening::TooShort => IngestStats::bump(&self.stats.too_short),
            Screening::Accepted => {
                if let Err(e) = self.tx.try_send(message) {
                    IngestStats::bump(&self.stats.dropped);
                    let (reason, message) = match e {
                        mpsc::error::TrySendError::Full(m) => ("queue full", m),
                        mpsc::error::TrySendError::Closed(m) => ("queue closed", m),
                    };
                    tracing::warn!(
                        chat_id = %message.chat_id,
                        message_id = %message.message_id,
                        reason,
                        "Dropping chat message"
                    );
                }
            }
        }
        screening
    }
}

/// Create the pipeline and spawn `workers` ingestion workers
///
/// Workers exit once every [`EventPipeline`] handle is dropped and the queue
/// has drained.
pub fn spawn_pipeline(
    pool: SqlitePool,
    filter: ChannelFilter,
    min_body_chars: usize,
    queue_capacity: usize,
    workers: usize,
    stats: Arc<IngestStats>,
) -> (EventPipeline, JoinSet<()>) {
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    let rx = Arc::new(Mutex::new(rx));
    let filter = Arc::new(filter);

    let mut join_set = JoinSet::new();
    for worker_id in 0..workers.max(1) {
        let rx = Arc::clone(&rx);
        let pool = pool.clone();
        let filter = Arc::clone(&filter);
        let stats = Arc::clone(&stats);
        join_set.spawn(async move {
            run_worker(worker_id, rx, pool, filter, stats).await;
        });
    }

    let pipeline = EventPipeline {
        tx,
        min_body_chars,
        stats,
    };
    (pipeline, join_set)
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    pool: SqlitePool,
    filter: Arc<ChannelFilter>,
    stats: Arc<IngestStats>,
) {
    tracing::debug!(worker_id, "Ingestion worker started");

    loop {
        let message = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(message) = message else {
            break;
        };

        let chat_id = message.chat_id.clone();
        let message_id = message.message_id.clone();

        if !run_isolated(ingest_message(message, &pool, &filter, &stats), &stats).await {
            tracing::error!(worker_id, chat_id = %chat_id, message_id = %message_id, "Message handler panicked");
        }
    }

    tracing::debug!(worker_id, "Ingestion worker stopped");
}

/// Run one message's work so that a panic only costs that message
///
/// Returns `false` (and counts a failure) when `work` panicked.
async fn run_isolated<F>(work: F, stats: &IngestStats) -> bool
where
    F: Future<Output = ()>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(()) => true,
        Err(_) => {
            IngestStats::bump(&stats.failed);
            false
        }
    }
}

async fn ingest_message(message: InboundMessage, pool: &SqlitePool, filter: &ChannelFilter, stats: &IngestStats) {
    let label = message
        .chat_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(message.chat_id.as_str());

    if !filter.is_monitored(label) {
        IngestStats::bump(&stats.filtered);
        tracing::debug!(chat = %label, "Chat not monitored");
        return;
    }

    let record = CanonicalRecord::from_chat_message(
        ChatMessageDraft {
            chat_id: message.chat_id,
            message_id: message.message_id,
            chat_name: message.chat_name,
            author: message.author,
            body: message.body,
            timestamp: message.timestamp,
            metrics: Default::default(),
        },
        Utc::now(),
    );

    match insert_if_absent(pool, &record).await {
        Ok(InsertOutcome::Inserted) => {
            IngestStats::bump(&stats.inserted);
            tracing::debug!(chat = %record.channel_label, message_id = %record.record_id, "Stored chat message");
        }
        Ok(InsertOutcome::AlreadyExists) => IngestStats::bump(&stats.duplicate),
        Err(e) => {
            IngestStats::bump(&stats.failed);
            tracing::warn!(
                chat = %record.channel_label,
                message_id = %record.record_id,
                error = %e,
                "Failed to store chat message"
            );
        }
    }
}
