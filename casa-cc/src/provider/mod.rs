//! Push provider abstraction
//!
//! A provider owns the network side of one chat session: it connects
//! (optionally resuming saved session state), then yields discrete events
//! until the connection ends.

pub mod bridge;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

pub use bridge::BridgeProvider;

/// Opaque session state that lets a restart skip the pairing challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub serde_json::Value);

/// One inbound chat message as delivered by the provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundMessage {
    pub message_id: String,
    pub chat_id: String,
    pub chat_name: Option<String>,
    /// Group chat, as opposed to a direct 1:1 conversation
    pub is_group: bool,
    pub author: Option<String>,
    pub body: Option<String>,
    /// Seconds since the Unix epoch
    pub timestamp: Option<i64>,
}

/// Events a provider delivers during a session
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Fresh session: the operator must confirm this code out-of-band
    PairingChallenge { code: String },
    /// Login succeeded; persist this to resume later
    Authenticated { session: SessionToken },
    Ready,
    Message(InboundMessage),
    /// Connection dropped; a reconnect may resume the session
    Disconnected { reason: String },
    /// Remote logout; saved session state is no longer valid
    LoggedOut,
}

/// Network side of a chat session
#[async_trait]
pub trait PushProvider: Send {
    /// Open a connection, resuming `resume` when given
    async fn connect(&mut self, resume: Option<SessionToken>) -> Result<(), SessionError>;

    /// Next event, or `None` when the connection ended without a disconnect event
    async fn next_event(&mut self) -> Result<Option<ProviderEvent>, SessionError>;

    /// Tear the connection down gracefully
    async fn close(&mut self) -> Result<(), SessionError>;
}
