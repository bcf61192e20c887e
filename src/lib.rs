//! # ripc-client
//!
//! Client runtime for the RIPC request/response + event protocol.
//!
//! An agent process listens on a UDP port. This crate talks to it with
//! correlated requests and receives the unsolicited events it publishes.
//!
//! ## Architecture
//!
//! - **Wire** (`protocol`): one frame per datagram, a 24-byte big-endian
//!   header followed by the payload
//! - **Payload** (`codec`): a CBOR map (or, for older agents, JSON inside a
//!   CBOR byte string)
//! - **Transport** (`transport`): a connected UDP socket with a background
//!   receive loop
//! - **Client** (`AgentClient`): correlation IDs, pending requests,
//!   deadlines, cancellation and event broadcast
//!
//! ## Example
//!
//! ```no_run
//! use ripc_client::{ClientBuilder, Req};
//!
//! #[tokio::main]
//! async fn main() -> ripc_client::Result<()> {
//!     let client = ClientBuilder::new()
//!         .endpoint("127.0.0.1", 9000)
//!         .connect()
//!         .await?;
//!
//!     let rsp = client.request(&Req::hello("agent")).await?;
//!     println!("{:?}", rsp.into_result()?);
//!
//!     client.close().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod pending;
pub mod protocol;
pub mod transport;

mod client;

pub use client::{AgentClient, ClientBuilder, DEFAULT_EVENT_CAPACITY, DEFAULT_REQUEST_TIMEOUT};
pub use codec::{CodecKind, Decoded, FrameCodec};
pub use config::ClientConfig;
pub use error::{Result, RipcError};
pub use message::{ops, Evt, Req, Rsp, Target};
pub use transport::{Transport, UdpTransport};
