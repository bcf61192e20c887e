//! Transport module - datagram delivery.
//!
//! A transport owns one connected socket, sends whole datagrams and hands
//! every received datagram to its subscribers. It knows nothing about
//! frames; short or malformed datagrams are the consumer's problem.
//!
//! - [`UdpTransport`] - connected IPv4 UDP socket (production)

mod udp;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use udp::{UdpTransport, RECV_BUFFER_SIZE};

/// Callback invoked with each received datagram.
///
/// Runs on the receive loop; it must not block.
pub type DatagramHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Handle returned by [`Transport::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Datagram transport bound to a single remote endpoint.
///
/// State machine: `Idle -> Started -> Idle`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Resolve `address`, open the socket, connect it to `address:port` and
    /// start delivering received datagrams.
    async fn start(&self, address: &str, port: u16) -> Result<()>;

    /// Send one datagram in a single call.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Stop receiving and release the socket. Idempotent.
    async fn stop(&self) -> Result<()>;

    /// Register a datagram handler.
    fn subscribe(&self, handler: DatagramHandler) -> SubscriptionId;

    /// Remove a handler. Returns `false` if it was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Registry of datagram handlers shared between a transport and its
/// receive loop.
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(SubscriptionId, DatagramHandler)>>,
}

impl Subscribers {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler.
    pub fn subscribe(&self, handler: DatagramHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    /// Remove a handler.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Hand `datagram` to every current handler. Returns how many ran.
    ///
    /// Handlers run outside the lock, so they may unsubscribe themselves.
    pub fn deliver(&self, datagram: Bytes) -> usize {
        let snapshot: Vec<DatagramHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in &snapshot {
            handler(datagram.clone());
        }
        snapshot.len()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.len())
            .finish()
    }
}
