//! Chat bridge provider
//!
//! Talks to a local bridge process that holds the actual chat-network client.
//! The wire format is newline-delimited JSON over TCP:
//!
//! ```text
//! -> {"type":"hello","session":<saved state or null>}
//! <- {"type":"qr","code":"..."}
//! <- {"type":"authenticated","session":{...}}
//! <- {"type":"ready"}
//! <- {"type":"message","id":"...","chat_id":"...","chat_name":"...","is_group":true,...}
//! <- {"type":"disconnected","reason":"..."}
//! <- {"type":"logged_out"}
//! -> {"type":"close"}
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::{InboundMessage, ProviderEvent, PushProvider, SessionToken};
use crate::error::SessionError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames sent by the bridge
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeFrame {
    Qr {
        code: String,
    },
    Authenticated {
        session: serde_json::Value,
    },
    Ready,
    Message {
        id: String,
        chat_id: String,
        #[serde(default)]
        chat_name: Option<String>,
        #[serde(default)]
        is_group: bool,
        #[serde(default)]
        author: Option<String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
    },
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },
    LoggedOut,
    #[serde(other)]
    Unknown,
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Provider speaking the bridge protocol
pub struct BridgeProvider {
    addr: String,
    connection: Option<Connection>,
}

impl BridgeProvider {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connection: None,
        }
    }

    fn frame_to_event(frame: BridgeFrame) -> Option<ProviderEvent> {
        let event = match frame {
            BridgeFrame::Qr { code } => ProviderEvent::PairingChallenge { code },
            BridgeFrame::Authenticated { session } => ProviderEvent::Authenticated {
                session: SessionToken(session),
            },
            BridgeFrame::Ready => ProviderEvent::Ready,
            BridgeFrame::Message {
                id,
                chat_id,
                chat_name,
                is_group,
                author,
                body,
                timestamp,
            } => ProviderEvent::Message(InboundMessage {
                message_id: id,
                chat_id,
                chat_name,
                is_group,
                author,
                body,
                timestamp,
            }),
            BridgeFrame::Disconnected { reason } => ProviderEvent::Disconnected {
                reason: reason.unwrap_or_else(|| "unspecified".to_string()),
            },
            BridgeFrame::LoggedOut => ProviderEvent::LoggedOut,
            BridgeFrame::Unknown => return None,
        };
        Some(event)
    }
}

#[async_trait]
impl PushProvider for BridgeProvider {
    async fn connect(&mut self, resume: Option<SessionToken>) -> Result<(), SessionError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| SessionError::Connect(format!("timed out connecting to {}", self.addr)))?
            .map_err(|e| SessionError::Connect(format!("{}: {}", self.addr, e)))?;

        let (read_half, mut writer) = stream.into_split();

        let hello = json!({
            "type": "hello",
            "session": resume.map(|token| token.0),
        });
        writer.write_all(format!("{}\n", hello).as_bytes()).await?;
        writer.flush().await?;

        self.connection = Some(Connection {
            reader: BufReader::new(read_half),
            writer,
        });

        tracing::debug!(addr = %self.addr, "Connected to chat bridge");
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ProviderEvent>, SessionError> {
        let connection = self.connection.as_mut().ok_or(SessionError::NotConnected)?;
        let mut line = Vec::new();

        loop {
            line.clear();
            if connection.reader.read_until(b'\n', &mut line).await? == 0 {
                return Ok(None);
            }

            let frame = line.trim_ascii();
            if frame.is_empty() {
                continue;
            }

            // One bad frame costs that frame, not the session
            match serde_json::from_slice::<BridgeFrame>(frame) {
                Ok(frame) => match Self::frame_to_event(frame) {
                    Some(event) => return Ok(Some(event)),
                    None => tracing::debug!("Ignoring unknown bridge frame"),
                },
                Err(e) => tracing::warn!(error = %e, bytes = frame.len(), "Discarding malformed bridge frame"),
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        let close = json!({ "type": "close" });
        connection
            .writer
            .write_all(format!("{}\n", close).as_bytes())
            .await?;
        connection.writer.shutdown().await?;

        tracing::debug!(addr = %self.addr, "Closed chat bridge connection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_frame_maps_to_event() {
        let frame: BridgeFrame = serde_json::from_str(
            r#"{"type":"message","id":"ABC","chat_id":"123@g.us","chat_name":"Milan Housing","is_group":true,"body":"Stanza libera"}"#,
        )
        .unwrap();

        let event = BridgeProvider::frame_to_event(frame).unwrap();
        let ProviderEvent::Message(message) = event else {
            panic!("expected message event");
        };
        assert_eq!(message.message_id, "ABC");
        assert!(message.is_group);
        assert_eq!(message.timestamp, None);
    }

    #[test]
    fn test_unknown_frame_type_is_ignored() {
        let frame: BridgeFrame = serde_json::from_str(r#"{"type":"typing","chat_id":"x"}"#).unwrap();
        assert!(BridgeProvider::frame_to_event(frame).is_none());
    }

    #[test]
    fn test_disconnect_without_reason() {
        let frame: BridgeFrame = serde_json::from_str(r#"{"type":"disconnected"}"#).unwrap();
        assert_eq!(
            BridgeProvider::frame_to_event(frame),
            Some(ProviderEvent::Disconnected {
                reason: "unspecified".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_next_event_before_connect_fails() {
        let mut provider = BridgeProvider::new("127.0.0.1:1");
        assert!(matches!(provider.next_event().await, Err(SessionError::NotConnected)));
    }
}
