//! Operator stop requests
//!
//! Both collectors stop on Ctrl+C or SIGTERM. The forum collector finishes
//! the channel in progress; the chat collector closes its session and drains
//! queued messages.

use std::fmt;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Which stop request arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    Interrupt,
    Terminate,
}

impl fmt::Display for StopRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopRequest::Interrupt => f.write_str("interrupt"),
            StopRequest::Terminate => f.write_str("terminate"),
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still works.
pub async fn wait_for_stop_request() -> StopRequest {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => StopRequest::Interrupt,
        _ = terminate => StopRequest::Terminate,
    }
}

/// Cancel `token` when the operator asks the collector to stop
///
/// Returns early, without logging, if `token` is cancelled some other way.
pub async fn cancel_on_stop_request(token: CancellationToken) {
    tokio::select! {
        request = wait_for_stop_request() => {
            info!(%request, "Stop requested, finishing work in progress");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}
