//! Session state machine states

use std::fmt;

/// Lifecycle of the chat session
///
/// `Disconnected → Connecting → Authenticating → Ready → Disconnected`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Connected, waiting for login (pairing or resumed session)
    Authenticating,
    /// Receiving events
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
        };
        f.write_str(name)
    }
}
