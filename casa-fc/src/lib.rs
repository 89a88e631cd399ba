//! casa-fc library interface
//!
//! Forum collector: polls configured channels once per invocation and stores
//! new posts through the shared dedup store.

pub mod error;
pub mod services;

pub use crate::error::FetchError;
pub use crate::services::forum_client::{FetchOutcome, FetchedBatch, ForumClient, PullSource};
pub use crate::services::politeness::PolitenessGate;
pub use crate::services::pull_orchestrator::{PullOrchestrator, RunSummary};
