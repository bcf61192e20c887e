//! Protocol client.
//!
//! The [`ClientBuilder`] provides a fluent API for choosing the codec,
//! transport and limits. The [`AgentClient`] correlates requests with
//! responses and fans events out to subscribers:
//!
//! 1. Encode the request payload and check it fits in one datagram
//! 2. Allocate a correlation ID and register a pending completion
//! 3. Send the frame
//! 4. Await the response, the deadline, cancellation or teardown
//!
//! Inbound datagrams are dispatched on the transport's receive loop:
//! responses complete pending requests, events go to the broadcast channel,
//! everything else is logged and discarded.
//!
//! # Example
//!
//! ```no_run
//! use ripc_client::{AgentClient, Req};
//!
//! #[tokio::main]
//! async fn main() -> ripc_client::Result<()> {
//!     let client = AgentClient::builder().build();
//!     client.connect("127.0.0.1", 9000).await?;
//!
//!     let mut events = client.subscribe();
//!     let rsp = client.request(&Req::hello("agent")).await?;
//!     println!("hello -> ok={}", rsp.ok);
//!
//!     while let Ok(evt) = events.recv().await {
//!         println!("{}: {:?}", evt.kind, evt.topic());
//!     }
//!     client.close().await
//! }
//! ```

use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{CodecKind, Decoded, FrameCodec};
use crate::config::ClientConfig;
use crate::error::{Result, RipcError};
use crate::message::{Evt, Req, Rsp};
use crate::pending::PendingTable;
use crate::protocol::{
    build_frame, now_ns, Frame, FrameType, WireHeader, HEADER_SIZE, MAX_DATAGRAM_SIZE,
};
use crate::transport::{SubscriptionId, Transport, UdpTransport};

/// Default request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default depth of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Builder for configuring and creating an [`AgentClient`].
pub struct ClientBuilder {
    codec: Arc<dyn FrameCodec>,
    transport: Option<Arc<dyn Transport>>,
    local_port: Option<u16>,
    request_timeout: Duration,
    event_capacity: usize,
    max_datagram_size: usize,
    endpoint: Option<(String, u16)>,
}

impl ClientBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            codec: CodecKind::default().build(),
            transport: None,
            local_port: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            endpoint: None,
        }
    }

    /// Create a builder from a loaded configuration, including its endpoint.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new()
            .codec(config.codec)
            .local_port(config.local_port)
            .request_timeout(config.request_timeout)
            .event_capacity(config.event_capacity)
            .max_datagram_size(config.max_datagram_size)
            .endpoint(config.address.clone(), config.port)
    }

    /// Select a built-in codec.
    ///
    /// Default: [`CodecKind::CborMap`]
    pub fn codec(mut self, kind: CodecKind) -> Self {
        self.codec = kind.build();
        self
    }

    /// Use a custom codec.
    pub fn with_codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Use a custom transport instead of UDP.
    ///
    /// `local_port` is ignored when a transport is supplied.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Bind the UDP socket to a fixed local port.
    ///
    /// Default: ephemeral
    pub fn local_port(mut self, port: Option<u16>) -> Self {
        self.local_port = port;
        self
    }

    /// Deadline used by [`AgentClient::request`].
    ///
    /// Default: 5 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Depth of the event broadcast channel. Slow subscribers lag past it.
    ///
    /// Default: 256
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Largest frame the client will send.
    ///
    /// Default: 65507
    pub fn max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    /// Agent endpoint used by [`ClientBuilder::connect`].
    pub fn endpoint(mut self, address: impl Into<String>, port: u16) -> Self {
        self.endpoint = Some((address.into(), port));
        self
    }

    /// Build the client without connecting.
    pub fn build(self) -> AgentClient {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(UdpTransport::with_local_port(self.local_port)));
        AgentClient::new(
            transport,
            self.codec,
            self.request_timeout,
            self.event_capacity,
            self.max_datagram_size,
        )
    }

    /// Build the client and connect it to the configured endpoint.
    pub async fn connect(mut self) -> Result<AgentClient> {
        let (address, port) = self
            .endpoint
            .take()
            .ok_or_else(|| RipcError::Config("no endpoint configured".to_string()))?;
        let client = self.build();
        client.connect(&address, port).await?;
        Ok(client)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// State reachable from the receive loop.
struct Shared {
    codec: Arc<dyn FrameCodec>,
    pending: PendingTable,
    events: Mutex<Option<broadcast::Sender<Evt>>>,
}

impl Shared {
    fn event_sender(&self) -> Option<broadcast::Sender<Evt>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Handle one inbound datagram.
    fn dispatch(&self, datagram: Bytes) {
        let frame = match Frame::parse(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "discarding frame");
                return;
            }
        };

        match frame.kind() {
            FrameType::Response => self.on_response(&frame),
            FrameType::Event => self.on_event(&frame),
            FrameType::Request => {
                debug!(corr = frame.correlation_id(), "discarding inbound request frame");
            }
        }
    }

    fn on_response(&self, frame: &Frame) {
        let corr = frame.correlation_id();
        match self.codec.try_decode(frame.payload()) {
            Some(Decoded::Response(rsp)) => {
                trace!(corr, ok = rsp.ok, "response");
                if !self.pending.complete(corr, rsp) {
                    debug!(corr, "unmatched response dropped");
                }
            }
            Some(Decoded::Event(_)) => {
                debug!(corr, "response frame carried an event payload, dropped");
            }
            None => {}
        }
    }

    fn on_event(&self, frame: &Frame) {
        match self.codec.try_decode(frame.payload()) {
            Some(Decoded::Event(evt)) => {
                let Some(events) = self.event_sender() else {
                    return;
                };
                let kind = evt.kind.clone();
                // No receivers is not an error; the event is simply missed.
                let delivered = events.send(evt).unwrap_or(0);
                trace!(%kind, delivered, "event");
            }
            Some(Decoded::Response(_)) => {
                debug!("event frame carried a response payload, dropped");
            }
            None => {}
        }
    }
}

/// Removes the pending entry when the request future finishes or is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    corr: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.corr);
    }
}

/// Request/response and event client for one agent.
///
/// Safe to share across tasks; every method takes `&self`.
pub struct AgentClient {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    subscription: Mutex<Option<SubscriptionId>>,
    next_corr: AtomicU32,
    request_timeout: Duration,
    max_datagram_size: usize,
    closed: AtomicBool,
}

impl AgentClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    fn new(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn FrameCodec>,
        request_timeout: Duration,
        event_capacity: usize,
        max_datagram_size: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        let shared = Arc::new(Shared {
            codec,
            pending: PendingTable::new(),
            events: Mutex::new(Some(events)),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let subscription = transport.subscribe(Arc::new(move |datagram: Bytes| {
            if let Some(shared) = weak.upgrade() {
                shared.dispatch(datagram);
            }
        }));

        Self {
            transport,
            shared,
            subscription: Mutex::new(Some(subscription)),
            next_corr: AtomicU32::new(1),
            request_timeout,
            max_datagram_size,
            closed: AtomicBool::new(false),
        }
    }

    /// Start the transport towards `address:port`.
    pub async fn connect(&self, address: &str, port: u16) -> Result<()> {
        self.ensure_open()?;
        self.transport.start(address, port).await?;
        info!(address, port, codec = self.shared.codec.name(), "client connected");
        Ok(())
    }

    /// Stop the transport. Pending requests keep waiting for their deadline.
    pub async fn disconnect(&self) -> Result<()> {
        self.transport.stop().await?;
        info!("client disconnected");
        Ok(())
    }

    /// Send `req` and wait up to the configured request timeout.
    pub async fn request(&self, req: &Req) -> Result<Rsp> {
        self.request_inner(req, Some(self.request_timeout), None).await
    }

    /// Send `req` and wait up to `timeout`.
    pub async fn request_with_timeout(&self, req: &Req, timeout: Duration) -> Result<Rsp> {
        self.request_inner(req, Some(timeout), None).await
    }

    /// Send `req` and wait until a response arrives or `cancel` fires.
    ///
    /// No deadline applies; the token is the only way out besides teardown.
    pub async fn request_with_cancel(&self, req: &Req, cancel: &CancellationToken) -> Result<Rsp> {
        self.request_inner(req, None, Some(cancel)).await
    }

    /// Send `req`, bounded by both `timeout` and `cancel`.
    pub async fn request_with(
        &self,
        req: &Req,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Rsp> {
        self.request_inner(req, Some(timeout), Some(cancel)).await
    }

    async fn request_inner(
        &self,
        req: &Req,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Rsp> {
        self.ensure_open()?;

        let payload = self.shared.codec.encode_request(req)?;
        let size = HEADER_SIZE + payload.len();
        if size > self.max_datagram_size {
            return Err(RipcError::OversizedDatagram {
                size,
                max: self.max_datagram_size,
            });
        }

        let corr = self.next_correlation_id();
        let header = WireHeader::request(corr, payload.len() as u32, now_ns());
        let frame = build_frame(&header, &payload);

        let rx = self.shared.pending.register(corr)?;
        let _guard = PendingGuard {
            pending: &self.shared.pending,
            corr,
        };
        // Teardown may have drained the table between the check above and registration.
        self.ensure_open()?;

        if let Err(e) = self.transport.send(&frame).await {
            debug!(corr, op = %req.op, error = %e, "request send failed");
            return Err(e);
        }
        trace!(corr, op = %req.op, len = frame.len(), "request sent");

        tokio::select! {
            result = rx => result.map_err(|_| RipcError::Cancelled),
            err = expire(timeout) => {
                debug!(corr, op = %req.op, "request timed out");
                Err(err)
            }
            _ = cancelled(cancel) => {
                debug!(corr, op = %req.op, "request cancelled");
                Err(RipcError::Cancelled)
            }
        }
    }

    /// Next non-zero correlation ID. Wraps at `u32::MAX`.
    fn next_correlation_id(&self) -> u32 {
        loop {
            let id = self.next_corr.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RipcError::Closed);
        }
        Ok(())
    }

    /// Subscribe to events delivered from now on.
    ///
    /// After [`AgentClient::close`] the receiver reports closed immediately.
    pub fn subscribe(&self) -> broadcast::Receiver<Evt> {
        match self.shared.event_sender() {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Events as a stream. Lagged gaps are logged and skipped.
    pub fn events(&self) -> impl Stream<Item = Evt> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|item| match item {
            Ok(evt) => Some(evt),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber lagged");
                None
            }
        })
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    /// Whether correlation ID `corr` is awaiting a response.
    pub fn is_pending(&self, corr: u32) -> bool {
        self.shared.pending.contains(corr)
    }

    /// Whether [`AgentClient::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Name of the payload codec in use.
    pub fn codec_name(&self) -> &'static str {
        self.shared.codec.name()
    }

    /// Tear down: stop dispatch, cancel every pending request, end event
    /// streams and stop the transport. Later calls are no-ops.
    ///
    /// This is the only teardown that stops the transport.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let cancelled = self.detach();
        info!(cancelled, "client closed");
        self.transport.stop().await
    }

    /// Synchronous part of teardown. Returns how many requests were cancelled.
    fn detach(&self) -> usize {
        if let Some(id) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.transport.unsubscribe(id);
        }
        let cancelled = self.shared.pending.cancel_all();
        self.shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        cancelled
    }
}

/// Dropping without [`AgentClient::close`] stops dispatch and cancels pending
/// requests but cannot stop the transport, which needs an `await`.
/// `UdpTransport` stops its own receive loop when dropped; a custom transport
/// shared through [`ClientBuilder::transport`] keeps running.
impl Drop for AgentClient {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.detach();
        }
    }
}

async fn expire(timeout: Option<Duration>) -> RipcError {
    match timeout {
        Some(duration) => {
            tokio::time::sleep(duration).await;
            RipcError::Timeout(duration)
        }
        None => pending().await,
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => pending().await,
    }
}
