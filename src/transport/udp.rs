//! Connected UDP transport.
//!
//! One IPv4 socket per instance, bound locally (ephemeral or fixed port)
//! and then connected to the agent. The socket must be bound before it is
//! connected; some platforms reject `connect` on an unbound UDP socket with
//! an invalid-argument error.
//!
//! # Example
//!
//! ```no_run
//! use ripc_client::transport::{Transport, UdpTransport};
//!
//! # async fn run() -> ripc_client::error::Result<()> {
//! let transport = UdpTransport::new();
//! transport.start("127.0.0.1", 9000).await?;
//! transport.send(b"datagram").await?;
//! transport.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{DatagramHandler, Subscribers, SubscriptionId, Transport};
use crate::error::{Result, RipcError};

/// Receive buffer size; large enough for any UDP datagram.
pub const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// State that only exists between `start` and `stop`.
struct Running {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    remote: SocketAddr,
    cancel: CancellationToken,
    receiver: JoinHandle<()>,
}

/// UDP transport bound to one remote endpoint.
pub struct UdpTransport {
    local_port: Option<u16>,
    subscribers: Arc<Subscribers>,
    running: Mutex<Option<Running>>,
}

impl UdpTransport {
    /// Transport binding an ephemeral local port.
    pub fn new() -> Self {
        Self::with_local_port(None)
    }

    /// Transport binding a fixed local port (`None` = ephemeral).
    pub fn with_local_port(local_port: Option<u16>) -> Self {
        Self {
            local_port,
            subscribers: Arc::new(Subscribers::new()),
            running: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `start` has run and `stop` has not.
    pub fn is_started(&self) -> bool {
        self.state().is_some()
    }

    /// Local address of the bound socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state().as_ref().map(|r| r.local)
    }

    /// Remote endpoint the socket is connected to.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.state().as_ref().map(|r| r.remote)
    }

    async fn resolve_ipv4(address: &str, port: u16) -> Result<SocketAddr> {
        tokio::net::lookup_host((address, port))
            .await?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| RipcError::AddressResolution(address.to_string()))
    }

    fn bind(&self) -> Result<UdpSocket> {
        let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.local_port.unwrap_or(0)));
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&local.into()).map_err(|e| {
            warn!(%local, error = %e, "local bind failed");
            e
        })?;
        Ok(UdpSocket::from_std(socket.into())?)
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn start(&self, address: &str, port: u16) -> Result<()> {
        if self.is_started() {
            return Err(RipcError::AlreadyStarted);
        }

        let remote = Self::resolve_ipv4(address, port).await?;
        let socket = self.bind()?;
        socket.connect(remote).await.map_err(|e| {
            warn!(%remote, error = %e, "connect failed");
            e
        })?;
        let local = socket.local_addr()?;
        let socket = Arc::new(socket);

        let mut state = self.state();
        if state.is_some() {
            return Err(RipcError::AlreadyStarted);
        }
        let cancel = CancellationToken::new();
        let receiver = tokio::spawn(receive_loop(
            socket.clone(),
            self.subscribers.clone(),
            cancel.clone(),
        ));
        *state = Some(Running {
            socket,
            local,
            remote,
            cancel,
            receiver,
        });

        info!(%remote, %local, "udp transport started");
        Ok(())
    }

    async fn send(&self, payload: &[u8]) -> Result<()> {
        let socket = self
            .state()
            .as_ref()
            .map(|r| r.socket.clone())
            .ok_or(RipcError::NotStarted)?;

        trace!(len = payload.len(), "SEND");
        let sent = socket.send(payload).await?;
        if sent != payload.len() {
            return Err(RipcError::Protocol(format!(
                "short datagram write: {sent} of {} bytes",
                payload.len()
            )));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let running = self.state().take();
        let Some(running) = running else {
            return Ok(());
        };
        running.cancel.cancel();
        // The loop holds the last other socket reference; wait so the port is free on return.
        let _ = running.receiver.await;
        info!(remote = %running.remote, "udp transport stopped");
        Ok(())
    }

    fn subscribe(&self, handler: DatagramHandler) -> SubscriptionId {
        self.subscribers.subscribe(handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Some(running) = self.state().take() {
            running.cancel.cancel();
        }
    }
}

/// Deliver datagrams until cancelled or the socket reports a fatal error.
async fn receive_loop(
    socket: Arc<UdpSocket>,
    subscribers: Arc<Subscribers>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("receive loop cancelled");
                break;
            }
            result = socket.recv(&mut buf) => match result {
                Ok(n) => {
                    trace!(len = n, "RECV");
                    subscribers.deliver(Bytes::copy_from_slice(&buf[..n]));
                }
                // ICMP unreachable from an earlier send; the agent may come up later.
                Err(e) if is_transient(&e) => {
                    debug!(error = %e, "transient receive error");
                }
                Err(e) => {
                    warn!(error = %e, "receive failed, receive loop exiting");
                    break;
                }
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}
