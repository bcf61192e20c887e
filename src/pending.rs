//! Pending request table.
//!
//! Maps correlation IDs to the one-shot completion of the request waiting
//! for them. Every entry is removed exactly once: by the matching response,
//! by the caller giving up, or by client teardown. Whichever comes first
//! wins; the others find nothing and are no-ops.
//!
//! Teardown resolves waiters by dropping their senders, which the waiting
//! side observes as cancellation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::{Result, RipcError};
use crate::message::Rsp;

/// Concurrent map of in-flight requests.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<u32, oneshot::Sender<Rsp>>>,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, oneshot::Sender<Rsp>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a completion for `id`.
    ///
    /// # Errors
    ///
    /// [`RipcError::CorrelationCollision`] if `id` is still pending. The
    /// existing entry is left untouched.
    pub fn register(&self, id: u32) -> Result<oneshot::Receiver<Rsp>> {
        let mut entries = self.lock();
        if entries.contains_key(&id) {
            return Err(RipcError::CorrelationCollision(id));
        }
        let (tx, rx) = oneshot::channel();
        entries.insert(id, tx);
        Ok(rx)
    }

    /// Resolve `id` with a response.
    ///
    /// Returns `false` when nothing was pending under `id`. A waiter that
    /// already went away still counts as matched.
    pub fn complete(&self, id: u32, rsp: Rsp) -> bool {
        match self.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(rsp);
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `id`, if any.
    pub fn remove(&self, id: u32) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Cancel every pending entry. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        // Senders are dropped outside the lock.
        drained.len()
    }

    /// Whether `id` is pending.
    pub fn contains(&self, id: u32) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
