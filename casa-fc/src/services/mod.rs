//! Forum collector services

pub mod forum_client;
pub mod politeness;
pub mod pull_orchestrator;
