//! casa-cc library interface
//!
//! Chat collector: keeps one long-lived session with a chat network open,
//! screens each inbound group message and stores it through the shared dedup
//! store.

pub mod collector;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod session;

pub use crate::collector::ChatCollector;
pub use crate::error::SessionError;
pub use crate::pipeline::{IngestSnapshot, IngestStats};
pub use crate::provider::{InboundMessage, ProviderEvent, PushProvider, SessionToken};
pub use crate::session::{SessionState, SessionStore};
