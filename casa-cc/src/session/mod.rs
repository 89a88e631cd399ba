//! Chat session lifecycle
//!
//! The runner owns the provider and drives the state machine:
//! connect (resuming saved state when there is some), authenticate, receive
//! events until the connection is lost, back off, reconnect. Reconnection is
//! unconditional; only cancellation ends the loop.

pub mod backoff;
pub mod state;
pub mod store;

pub use backoff::ReconnectBackoff;
pub use state::SessionState;
pub use store::SessionStore;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pipeline::EventPipeline;
use crate::provider::{ProviderEvent, PushProvider};

/// How one connect → receive cycle ended
enum CycleEnd {
    Cancelled,
    Lost(String),
}

pub(crate) struct SessionRunner<P: PushProvider> {
    provider: P,
    store: SessionStore,
    backoff: ReconnectBackoff,
    state_tx: watch::Sender<SessionState>,
    pipeline: EventPipeline,
    cancel: CancellationToken,
}

impl<P: PushProvider> SessionRunner<P> {
    pub(crate) fn new(
        provider: P,
        store: SessionStore,
        backoff: ReconnectBackoff,
        state_tx: watch::Sender<SessionState>,
        pipeline: EventPipeline,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            store,
            backoff,
            state_tx,
            pipeline,
            cancel,
        }
    }

    /// Run until cancelled, then close the session
    ///
    /// Dropping the runner drops the pipeline handle, which lets the workers
    /// drain the queue and exit.
    pub(crate) async fn run(mut self) {
        loop {
            match self.run_cycle().await {
                CycleEnd::Cancelled => break,
                CycleEnd::Lost(reason) => {
                    self.set_state(SessionState::Disconnected);
                    if let Err(e) = self.provider.close().await {
                        tracing::debug!(error = %e, "Closing lost chat connection failed");
                    }

                    let delay = self.backoff.next_delay();
                    info!(
                        reason = %reason,
                        delay_ms = delay.as_millis() as u64,
                        "Chat session disconnected, reconnecting"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => break,
                    }
                }
            }
        }

        if let Err(e) = self.provider.close().await {
            warn!(error = %e, "Chat session teardown failed");
        }
        self.set_state(SessionState::Disconnected);
        info!("Chat session closed");
    }

    async fn run_cycle(&mut self) -> CycleEnd {
        if self.cancel.is_cancelled() {
            return CycleEnd::Cancelled;
        }

        self.set_state(SessionState::Connecting);
        let resume = self.store.load().await;
        let resuming = resume.is_some();

        let connected = tokio::select! {
            result = self.provider.connect(resume) => result,
            _ = self.cancel.cancelled() => return CycleEnd::Cancelled,
        };
        if let Err(e) = connected {
            return CycleEnd::Lost(e.to_string());
        }

        self.set_state(SessionState::Authenticating);
        info!(resuming, "Chat connection open, authenticating");

        loop {
            let next = tokio::select! {
                result = self.provider.next_event() => result,
                _ = self.cancel.cancelled() => return CycleEnd::Cancelled,
            };

            match next {
                Ok(Some(event)) => {
                    if let Some(end) = self.handle_event(event).await {
                        return end;
                    }
                }
                Ok(None) => return CycleEnd::Lost("connection closed by provider".to_string()),
                Err(e) => return CycleEnd::Lost(e.to_string()),
            }
        }
    }

    async fn handle_event(&mut self, event: ProviderEvent) -> Option<CycleEnd> {
        match event {
            ProviderEvent::PairingChallenge { code } => {
                render_pairing_challenge(&code);
                None
            }
            ProviderEvent::Authenticated { session } if session.0.is_null() => {
                warn!("Chat login reported without session state; nothing saved, next start will need pairing");
                None
            }
            ProviderEvent::Authenticated { session } => {
                match self.store.save(&session).await {
                    Ok(()) => info!(path = %self.store.path().display(), "Chat session saved"),
                    Err(e) => warn!(error = %e, "Could not save chat session; next start will need pairing"),
                }
                None
            }
            ProviderEvent::Ready => {
                self.set_state(SessionState::Ready);
                self.backoff.reset();
                None
            }
            ProviderEvent::Message(message) => {
                self.pipeline.submit(message);
                None
            }
            ProviderEvent::Disconnected { reason } => Some(CycleEnd::Lost(reason)),
            ProviderEvent::LoggedOut => {
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "Could not remove saved chat session");
                }
                Some(CycleEnd::Lost("logged out remotely, pairing required".to_string()))
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "Chat session state");
        }
    }
}

/// Show a pairing code to the operator
fn render_pairing_challenge(code: &str) {
    info!("Chat pairing required; confirm the code shown on the console");
    eprintln!();
    eprintln!("==== Chat pairing ====");
    eprintln!("Link this collector from the chat app (Linked devices) using:");
    eprintln!();
    eprintln!("    {}", code);
    eprintln!();
    eprintln!("======================");
}
