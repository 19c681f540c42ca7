//! IPC socket round-trip: length-prefixed MessagePack over a Unix socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use liveagent_core::ipc::{RuntimeRequest, RuntimeResponse};
use liveagent_core::{DispatchError, DispatchGateway, DispatchRequest, MemorySessionStore};
use liveagent_server::runtime::AgentRuntime;
use liveagent_server::server::run_unix_server;
use tokio::net::UnixStream;
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

struct AcceptAll;

#[async_trait]
impl DispatchGateway for AcceptAll {
    async fn request_join(&self, _request: &DispatchRequest) -> Result<(), DispatchError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "accept-all"
    }
}

async fn connect(path: &std::path::Path) -> UnixStream {
    for _ in 0..50 {
        if let Ok(stream) = UnixStream::connect(path).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("IPC server did not come up at {}", path.display());
}

async fn roundtrip(
    framed: &mut Framed<UnixStream, LengthDelimitedCodec>,
    request: &RuntimeRequest,
) -> RuntimeResponse {
    let bytes = rmp_serde::to_vec_named(request).unwrap();
    framed.send(Bytes::from(bytes)).await.unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    rmp_serde::from_slice(&frame).unwrap()
}

#[tokio::test]
async fn test_ipc_session_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("liveagent.sock");
    let socket_str = socket.to_str().unwrap().to_string();

    let runtime = Arc::new(AgentRuntime::new(
        Arc::new(MemorySessionStore::new()),
        Arc::new(AcceptAll),
        10,
    ));
    let (tx, _rx) = broadcast::channel(1);
    let server = tokio::spawn({
        let runtime = runtime.clone();
        let shutdown = tx.subscribe();
        async move { run_unix_server(&socket_str, runtime, shutdown).await }
    });

    let stream = connect(&socket).await;
    let codec = LengthDelimitedCodec::builder().little_endian().new_codec();
    let mut framed = Framed::new(stream, codec);

    let pong = roundtrip(&mut framed, &RuntimeRequest::Ping).await;
    assert!(pong.is_ok());

    let registered = roundtrip(
        &mut framed,
        &RuntimeRequest::RegisterAgent {
            agent_id: 42,
            tenant_id: 1,
            config: serde_json::json!({
                "sttProvider": "deepgram",
                "ttsProvider": "elevenlabs",
                "llmProvider": "openai"
            }),
        },
    )
    .await;
    assert!(registered.is_ok(), "register failed: {:?}", registered.error);

    let created = roundtrip(
        &mut framed,
        &RuntimeRequest::CreateSession {
            agent_id: 42,
            tenant_id: 1,
            room_name: "x".to_string(),
            participant_name: None,
        },
    )
    .await;
    assert!(created.is_ok(), "create failed: {:?}", created.error);
    let data = created.data.unwrap();
    let session_id = data["session"]["sessionId"].as_str().unwrap().to_string();

    let status = roundtrip(&mut framed, &RuntimeRequest::GetAgentStatus { agent_id: 42 }).await;
    let status = status.data.unwrap();
    assert_eq!(status["activeSessions"], 1);
    assert_eq!(status["maxSessions"], 10);

    let ended = roundtrip(&mut framed, &RuntimeRequest::EndSession { session_id }).await;
    assert!(ended.is_ok());

    let missing = roundtrip(
        &mut framed,
        &RuntimeRequest::CreateSession {
            agent_id: 99,
            tenant_id: 1,
            room_name: "x".to_string(),
            participant_name: None,
        },
    )
    .await;
    assert!(!missing.is_ok());
    assert_eq!(missing.kind.as_deref(), Some("not_registered"));

    drop(framed);
    tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert!(!socket.exists());
}

#[tokio::test]
async fn test_ipc_rejects_garbage_frame() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("garbage.sock");
    let socket_str = socket.to_str().unwrap().to_string();

    let runtime = Arc::new(AgentRuntime::new(
        Arc::new(MemorySessionStore::new()),
        Arc::new(AcceptAll),
        10,
    ));
    let (tx, _rx) = broadcast::channel(1);
    let server = tokio::spawn({
        let shutdown = tx.subscribe();
        async move { run_unix_server(&socket_str, runtime, shutdown).await }
    });

    let stream = connect(&socket).await;
    let codec = LengthDelimitedCodec::builder().little_endian().new_codec();
    let mut framed = Framed::new(stream, codec);

    framed.send(Bytes::from_static(&[0xc1, 0x00])).await.unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    let response: RuntimeResponse = rmp_serde::from_slice(&frame).unwrap();
    assert!(!response.is_ok());
    assert!(response.error.unwrap().contains("Deserialization error"));

    drop(framed);
    tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
