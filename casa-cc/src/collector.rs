//! Push orchestrator
//!
//! Owns the chat session for the life of the process: wires the provider to
//! the ingestion pipeline on `start`, tears everything down on `stop`.

use std::sync::Arc;
use std::time::Duration;

use casa_common::config::ChatConfig;
use casa_common::ChannelFilter;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::pipeline::{spawn_pipeline, IngestSnapshot, IngestStats};
use crate::provider::PushProvider;
use crate::session::{ReconnectBackoff, SessionRunner, SessionState, SessionStore};

/// Running chat collector
pub struct ChatCollector {
    cancel: CancellationToken,
    state_rx: watch::Receiver<SessionState>,
    stats: Arc<IngestStats>,
    session_task: JoinHandle<()>,
    workers: JoinSet<()>,
}

impl ChatCollector {
    /// Spawn the session and the ingestion workers
    pub fn start<P>(provider: P, pool: SqlitePool, config: &ChatConfig, session_store: SessionStore) -> Self
    where
        P: PushProvider + 'static,
    {
        let stats = Arc::new(IngestStats::default());
        let (pipeline, workers) = spawn_pipeline(
            pool,
            ChannelFilter::new(&config.allow_list),
            config.min_body_chars,
            config.queue_capacity,
            config.workers,
            Arc::clone(&stats),
        );

        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let cancel = CancellationToken::new();
        let backoff = ReconnectBackoff::new(
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_max_ms),
            true,
        );

        let runner = SessionRunner::new(provider, session_store, backoff, state_tx, pipeline, cancel.clone());
        let session_task = tokio::spawn(runner.run());

        info!(workers = config.workers, allow_list = ?config.allow_list, "Chat collector started");

        Self {
            cancel,
            state_rx,
            stats,
            session_task,
            workers,
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch session state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn stats(&self) -> IngestSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting events, close the session, and drain queued messages
    pub async fn stop(mut self) -> IngestSnapshot {
        self.cancel.cancel();

        if let Err(e) = self.session_task.await {
            error!("Chat session task failed: {}", e);
        }

        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!("Ingestion worker failed: {}", e);
            }
        }

        let snapshot = self.stats.snapshot();
        info!(%snapshot, "Chat collector stopped");
        snapshot
    }
}
