//! # Casa Common Library
//!
//! Shared code for the Casa content collectors:
//! - Canonical record model (the shape every source maps into)
//! - Channel allow-list filter
//! - Dedup store (SQLite, insert-if-absent only)
//! - Configuration loading and root folder resolution
//! - Logging initialization

pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod logging;
pub mod record;
pub mod shutdown;

pub use error::{Error, Result};
pub use filter::ChannelFilter;
pub use record::{CanonicalRecord, SourceType};
