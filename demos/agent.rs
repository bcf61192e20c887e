//! Fake agent - answers requests and publishes a heartbeat event.
//!
//! Listens on `127.0.0.1:9000` (or the port given as the first argument).
//! Every request is answered with `ok = true`; after the first request the
//! agent sends a `data` event to that client once per second.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tracing_subscriber::EnvFilter;

use ripc_client::codec::value::{cbor_to_json, json_to_cbor};
use ripc_client::protocol::{build_frame, now_ns, Frame, FrameType, WireHeader};

fn encode(body: &Value) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&json_to_cbor(body), &mut buf)?;
    Ok(buf)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let port: u16 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 9000,
    };
    let socket = UdpSocket::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "agent listening");

    let mut client: Option<SocketAddr> = None;
    let mut heartbeat = tokio::time::interval(Duration::from_secs(1));
    let mut seq = 0u64;
    let mut buf = vec![0u8; 65_536];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (n, from) = received?;
                let frame = match Frame::parse(Bytes::copy_from_slice(&buf[..n])) {
                    Ok(frame) if frame.kind() == FrameType::Request => frame,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(%from, error = %e, "bad frame");
                        continue;
                    }
                };
                let request = cbor_to_json(ciborium::de::from_reader(frame.payload())?)?;
                let op = request["op"].as_str().unwrap_or_default().to_string();
                tracing::info!(%from, corr = frame.correlation_id(), %op, "request");

                let payload = encode(&json!({
                    "ok": true,
                    "action": op,
                    "result": { "agent": "demo", "echo": request["args"] },
                }))?;
                let header =
                    WireHeader::response(frame.correlation_id(), payload.len() as u32, now_ns());
                socket.send_to(&build_frame(&header, &payload), from).await?;
                client = Some(from);
            }
            _ = heartbeat.tick() => {
                let Some(to) = client else { continue };
                seq += 1;
                let payload = encode(&json!({
                    "evt": "data",
                    "topic": "Heartbeat",
                    "type": "Counter",
                    "display": { "seq": seq },
                }))?;
                let header = WireHeader::event(0, payload.len() as u32, now_ns());
                socket.send_to(&build_frame(&header, &payload), to).await?;
            }
        }
    }
}
