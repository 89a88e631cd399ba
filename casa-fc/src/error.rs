//! Error types for casa-fc

use thiserror::Error;

/// Forum fetch errors
///
/// Channel-not-found is not represented here; it is a normal
/// [`FetchOutcome`](crate::FetchOutcome).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid forum URL: {0}")]
    InvalidUrl(String),
}

/// Reasons a single channel failed during a run
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("store failed: {0}")]
    Store(#[from] casa_common::Error),
}
