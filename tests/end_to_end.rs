//! End-to-end tests against a fake agent on a loopback UDP socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use ripc_client::codec::value::{cbor_to_json, json_to_cbor};
use ripc_client::protocol::{build_frame, Frame, FrameType, WireHeader};
use ripc_client::{AgentClient, ClientBuilder, ClientConfig, CodecKind, Req, RipcError};

const WAIT: Duration = Duration::from_secs(5);

/// Minimal agent: receives request frames and sends whatever the test asks.
struct FakeAgent {
    socket: UdpSocket,
}

struct Inbound {
    corr: u32,
    body: Value,
    from: SocketAddr,
}

impl FakeAgent {
    async fn bind() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    async fn recv(&self) -> Inbound {
        let mut buf = vec![0u8; 65_536];
        let (n, from) = tokio::time::timeout(WAIT, self.socket.recv_from(&mut buf))
            .await
            .expect("agent saw no request")
            .unwrap();
        let frame = Frame::parse(Bytes::copy_from_slice(&buf[..n])).unwrap();
        assert_eq!(frame.kind(), FrameType::Request);
        let body = cbor_to_json(ciborium::de::from_reader(frame.payload()).unwrap()).unwrap();
        Inbound {
            corr: frame.correlation_id(),
            body,
            from,
        }
    }

    async fn respond(&self, to: SocketAddr, corr: u32, body: Value) {
        let payload = encode(&body);
        let frame = build_frame(&WireHeader::response(corr, payload.len() as u32, 0), &payload);
        self.socket.send_to(&frame, to).await.unwrap();
    }

    async fn emit(&self, to: SocketAddr, body: Value) {
        let payload = encode(&body);
        let frame = build_frame(&WireHeader::event(0, payload.len() as u32, 0), &payload);
        self.socket.send_to(&frame, to).await.unwrap();
    }
}

fn encode(body: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&json_to_cbor(body), &mut buf).unwrap();
    buf
}

async fn connected(agent: &FakeAgent) -> Arc<AgentClient> {
    let client = AgentClient::builder().build();
    client.connect("127.0.0.1", agent.port()).await.unwrap();
    Arc::new(client)
}

#[tokio::test]
async fn test_hello_round_trip() {
    let agent = FakeAgent::bind().await;
    let client = connected(&agent).await;

    let c = client.clone();
    let call = tokio::spawn(async move { c.request(&Req::hello("agent")).await });

    let inbound = agent.recv().await;
    assert_eq!(inbound.corr, 1);
    assert_eq!(inbound.body["op"], "hello");
    assert_eq!(inbound.body["target"], json!({ "kind": "agent" }));
    assert_eq!(inbound.body["proto"], 1);

    agent
        .respond(
            inbound.from,
            inbound.corr,
            json!({ "ok": true, "action": "hello", "result": { "version": "1.0" } }),
        )
        .await;

    let rsp = call.await.unwrap().unwrap();
    assert!(rsp.ok);
    assert_eq!(rsp.into_result().unwrap(), Some(json!({ "version": "1.0" })));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_unsolicited_event_reaches_subscriber() {
    let agent = FakeAgent::bind().await;
    let client = connected(&agent).await;
    let mut events = Box::pin(client.events());

    // The agent learns the client's address from its first request.
    let c = client.clone();
    let call = tokio::spawn(async move { c.request(&Req::hello("agent")).await });
    let inbound = agent.recv().await;
    agent
        .respond(inbound.from, inbound.corr, json!({ "ok": true }))
        .await;
    call.await.unwrap().unwrap();

    agent
        .emit(
            inbound.from,
            json!({ "evt": "data", "topic": "X", "type": "Y", "display": { "v": 3 } }),
        )
        .await;

    let evt = tokio::time::timeout(WAIT, events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(evt.kind, "data");
    assert_eq!(evt.topic(), Some("X"));
    assert_eq!(evt.event_type(), Some("Y"));
    assert_eq!(evt.display(), Some(&json!({ "v": 3 })));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_requests_answered_out_of_order() {
    const N: usize = 8;
    let agent = FakeAgent::bind().await;
    let client = connected(&agent).await;

    let mut calls = Vec::new();
    for i in 0..N {
        let c = client.clone();
        calls.push(tokio::spawn(async move {
            let rsp = c
                .request(&Req::new("get", "reader").args(json!({ "i": i })))
                .await?;
            Ok::<_, RipcError>((i, rsp))
        }));
    }

    let mut inbound = Vec::new();
    for _ in 0..N {
        inbound.push(agent.recv().await);
    }
    let mut corrs: Vec<u32> = inbound.iter().map(|m| m.corr).collect();
    corrs.sort_unstable();
    corrs.dedup();
    assert_eq!(corrs.len(), N);

    for m in inbound.iter().rev() {
        agent
            .respond(m.from, m.corr, json!({ "ok": true, "result": m.body["args"]["i"] }))
            .await;
    }

    for call in calls {
        let (i, rsp) = call.await.unwrap().unwrap();
        assert_eq!(rsp.data, Some(json!(i)));
    }
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_unmatched_response_is_dropped() {
    let agent = FakeAgent::bind().await;
    let client = connected(&agent).await;

    let c = client.clone();
    let call = tokio::spawn(async move { c.request(&Req::hello("agent")).await });
    let inbound = agent.recv().await;

    agent
        .respond(inbound.from, inbound.corr + 1000, json!({ "ok": false }))
        .await;
    agent
        .respond(inbound.from, inbound.corr, json!({ "ok": true, "action": "hello" }))
        .await;

    let rsp = call.await.unwrap().unwrap();
    assert!(rsp.ok);
    assert_eq!(rsp.action.as_deref(), Some("hello"));
}

#[tokio::test]
async fn test_cancelled_request_leaves_others_running() {
    let agent = FakeAgent::bind().await;
    let client = connected(&agent).await;
    let token = CancellationToken::new();

    let c = client.clone();
    let t = token.clone();
    let doomed = tokio::spawn(async move { c.request_with_cancel(&Req::hello("agent"), &t).await });
    let first = agent.recv().await;

    let c = client.clone();
    let survivor = tokio::spawn(async move { c.request(&Req::hello("agent")).await });
    let second = agent.recv().await;

    token.cancel();
    assert!(matches!(doomed.await.unwrap(), Err(RipcError::Cancelled)));
    assert!(!client.is_pending(first.corr));

    agent
        .respond(first.from, first.corr, json!({ "ok": true }))
        .await;
    agent
        .respond(second.from, second.corr, json!({ "ok": true, "action": "hello" }))
        .await;
    assert!(survivor.await.unwrap().unwrap().ok);
}

#[tokio::test]
async fn test_request_without_reply_times_out() {
    let agent = FakeAgent::bind().await;
    let client = connected(&agent).await;

    let c = client.clone();
    let call = tokio::spawn(async move {
        c.request_with_timeout(&Req::hello("agent"), Duration::from_millis(200))
            .await
    });
    let inbound = agent.recv().await;

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, RipcError::Timeout(_)));
    assert!(!client.is_pending(inbound.corr));
}

#[tokio::test]
async fn test_close_cancels_in_flight_requests() {
    let agent = FakeAgent::bind().await;
    let client = connected(&agent).await;

    let c = client.clone();
    let call = tokio::spawn(async move { c.request(&Req::hello("agent")).await });
    agent.recv().await;

    client.close().await.unwrap();
    assert!(matches!(call.await.unwrap(), Err(RipcError::Cancelled)));
    assert_eq!(client.pending_requests(), 0);
    assert!(matches!(
        client.request(&Req::hello("agent")).await,
        Err(RipcError::Closed)
    ));
}

#[tokio::test]
async fn test_legacy_codec_end_to_end() {
    let agent = FakeAgent::bind().await;
    let client = Arc::new(
        ClientBuilder::new()
            .codec(CodecKind::CborJson)
            .endpoint("127.0.0.1", agent.port())
            .connect()
            .await
            .unwrap(),
    );
    assert_eq!(client.codec_name(), "cbor-json");

    let c = client.clone();
    let call = tokio::spawn(async move { c.request(&Req::hello("agent")).await });

    let mut buf = vec![0u8; 65_536];
    let (n, from) = agent.socket.recv_from(&mut buf).await.unwrap();
    let frame = Frame::parse(Bytes::copy_from_slice(&buf[..n])).unwrap();
    let ciborium::Value::Bytes(document) = ciborium::de::from_reader(frame.payload()).unwrap()
    else {
        panic!("expected byte string payload");
    };
    let request: Value = serde_json::from_slice(&document).unwrap();
    assert_eq!(request["target"], "agent");

    let mut reply = Vec::new();
    let body = serde_json::to_vec(&json!({ "ok": true, "action": "hello", "data": 5 })).unwrap();
    ciborium::ser::into_writer(&ciborium::Value::Bytes(body), &mut reply).unwrap();
    let datagram = build_frame(
        &WireHeader::response(frame.correlation_id(), reply.len() as u32, 0),
        &reply,
    );
    agent.socket.send_to(&datagram, from).await.unwrap();

    let rsp = call.await.unwrap().unwrap();
    assert_eq!(rsp.data, Some(json!(5)));
}

#[tokio::test]
async fn test_client_from_config() {
    let agent = FakeAgent::bind().await;
    let config = ClientConfig {
        port: agent.port(),
        request_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    config.validate_strict().unwrap();

    let client = ClientBuilder::from_config(&config).connect().await.unwrap();
    assert!(matches!(
        client.request(&Req::hello("agent")).await,
        Err(RipcError::Timeout(d)) if d == Duration::from_millis(100)
    ));
    client.close().await.unwrap();
}
