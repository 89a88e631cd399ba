//! Error types for casa-cc

use thiserror::Error;

/// Chat session errors
///
/// All of these end the current session cycle; the collector reconnects.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Session not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
