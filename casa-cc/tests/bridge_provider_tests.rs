//! Bridge protocol tests against an in-process fake bridge

use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use casa_cc::provider::BridgeProvider;
use casa_cc::{ChatCollector, ProviderEvent, PushProvider, SessionError, SessionStore, SessionToken};
use casa_common::config::{chat_session_path, database_path, ChatConfig, StoreConfig};
use casa_common::db::{count_records, open_store};
use casa_common::SourceType;

async fn bind_bridge() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

fn frame(value: Value) -> Vec<u8> {
    format!("{}\n", value).into_bytes()
}

#[tokio::test]
async fn test_handshake_events_and_close() {
    let (listener, addr) = bind_bridge().await;

    let bridge = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut writer) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let hello = lines.next_line().await.unwrap().unwrap();

        writer.write_all(&frame(json!({ "type": "qr", "code": "2@abc" }))).await.unwrap();
        writer.write_all(b"this is not json\n\n").await.unwrap();
        writer.write_all(&frame(json!({ "type": "typing", "chat_id": "1@g.us" }))).await.unwrap();
        writer.write_all(&frame(json!({ "type": "ready" }))).await.unwrap();
        writer
            .write_all(&frame(json!({
                "type": "message",
                "id": "3EB0C767D26A",
                "chat_id": "120363@g.us",
                "chat_name": "Milan Housing Group",
                "is_group": true,
                "author": "39333111222@c.us",
                "body": "Stanza doppia in Bicocca",
                "timestamp": 1700000000
            })))
            .await
            .unwrap();

        let close = lines.next_line().await.unwrap().unwrap();
        (hello, close)
    });

    let token = SessionToken(json!({ "wid": "39333@c.us" }));
    let mut provider = BridgeProvider::new(addr);
    provider.connect(Some(token.clone())).await.unwrap();

    assert_eq!(
        provider.next_event().await.unwrap(),
        Some(ProviderEvent::PairingChallenge { code: "2@abc".to_string() })
    );
    // Garbage, blank and unknown frames are skipped
    assert_eq!(provider.next_event().await.unwrap(), Some(ProviderEvent::Ready));

    let Some(ProviderEvent::Message(message)) = provider.next_event().await.unwrap() else {
        panic!("expected a message event");
    };
    assert_eq!(message.message_id, "3EB0C767D26A");
    assert_eq!(message.chat_name.as_deref(), Some("Milan Housing Group"));
    assert_eq!(message.timestamp, Some(1_700_000_000));

    provider.close().await.unwrap();

    let (hello, close) = bridge.await.unwrap();
    let hello: Value = serde_json::from_str(&hello).unwrap();
    assert_eq!(hello["type"], "hello");
    assert_eq!(hello["session"], token.0);
    let close: Value = serde_json::from_str(&close).unwrap();
    assert_eq!(close["type"], "close");
}

#[tokio::test]
async fn test_non_utf8_frame_is_skipped() {
    let (listener, addr) = bind_bridge().await;

    let bridge = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut writer) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        lines.next_line().await.unwrap().unwrap();

        writer.write_all(b"\xff\xfe garbage\n").await.unwrap();
        writer.write_all(b"{\"type\":\"qr\",\"code\":\"\xc3\x28\"}\n").await.unwrap();
        writer.write_all(&frame(json!({ "type": "ready" }))).await.unwrap();

        // Hold the socket open until the client closes
        lines.next_line().await.unwrap()
    });

    let mut provider = BridgeProvider::new(addr);
    provider.connect(None).await.unwrap();

    assert_eq!(provider.next_event().await.unwrap(), Some(ProviderEvent::Ready));

    provider.close().await.unwrap();
    bridge.await.unwrap();
}

#[tokio::test]
async fn test_fresh_session_sends_null_and_eof_ends_stream() {
    let (listener, addr) = bind_bridge().await;

    let bridge = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        lines.next_line().await.unwrap().unwrap()
    });

    let mut provider = BridgeProvider::new(addr);
    provider.connect(None).await.unwrap();

    let hello: Value = serde_json::from_str(&bridge.await.unwrap()).unwrap();
    assert!(hello["session"].is_null());

    // Bridge task ended and dropped its socket
    assert_eq!(provider.next_event().await.unwrap(), None);
}

#[tokio::test]
async fn test_connect_refused() {
    let (listener, addr) = bind_bridge().await;
    drop(listener);

    let mut provider = BridgeProvider::new(addr);
    let result = provider.connect(None).await;
    assert!(matches!(result, Err(SessionError::Connect(_))));
}

#[tokio::test]
async fn test_collector_over_bridge_stores_group_message() {
    let temp_dir = TempDir::new().unwrap();
    let pool = open_store(&database_path(temp_dir.path()), &StoreConfig::default())
        .await
        .unwrap();
    let (listener, addr) = bind_bridge().await;

    let bridge = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut writer) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        lines.next_line().await.unwrap().unwrap();

        writer
            .write_all(&frame(json!({ "type": "authenticated", "session": { "wid": "39333@c.us" } })))
            .await
            .unwrap();
        writer.write_all(&frame(json!({ "type": "ready" }))).await.unwrap();
        for _ in 0..2 {
            writer
                .write_all(&frame(json!({
                    "type": "message",
                    "id": "dup-1",
                    "chat_id": "120363@g.us",
                    "chat_name": "Affitti Milano Housing",
                    "is_group": true,
                    "body": "Bilocale arredato zona Navigli"
                })))
                .await
                .unwrap();
        }

        // Keep the connection open until the collector says goodbye
        lines.next_line().await.unwrap()
    });

    let config = ChatConfig {
        bridge_addr: addr.clone(),
        allow_list: vec!["housing".to_string()],
        backoff_initial_ms: 10,
        backoff_max_ms: 50,
        ..ChatConfig::default()
    };
    let session_store = SessionStore::new(chat_session_path(temp_dir.path()));
    let collector = ChatCollector::start(BridgeProvider::new(addr), pool.clone(), &config, session_store.clone());

    for _ in 0..500 {
        let stats = collector.stats();
        if stats.inserted + stats.duplicate == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let stats = collector.stop().await;
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.duplicate, 1);
    assert_eq!(count_records(&pool, Some(SourceType::PushChat)).await.unwrap(), 1);
    assert_eq!(
        session_store.load().await,
        Some(SessionToken(json!({ "wid": "39333@c.us" })))
    );

    let goodbye: Value = serde_json::from_str(&bridge.await.unwrap().unwrap()).unwrap();
    assert_eq!(goodbye["type"], "close");
}
