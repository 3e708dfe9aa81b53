// Deferred store writes
//
// Transitions that are already visible in memory (promotion, expiry, force
// clear) must not be undone when the store hiccups. Their durable writes are
// parked here and replayed in order before the next store access.

use crate::domain::{ResourceId, StatusUpdate};
use crate::error::{AppError, Result};
use crate::port::TicketStore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A store write waiting to be replayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredWrite {
    Status(StatusUpdate),
    DeleteAll(ResourceId),
}

/// Ordered queue of writes the store has not accepted yet
#[derive(Default)]
pub struct StoreOutbox {
    pending: Mutex<VecDeque<DeferredWrite>>,
    len: AtomicUsize,
}

impl StoreOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deferred writes
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replay deferred writes in order
    ///
    /// Stops at the first failure and leaves the rest queued.
    ///
    /// # Returns
    /// Number of writes applied
    pub async fn flush(&self, store: &dyn TicketStore) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }

        let mut pending = self.pending.lock().await;
        let mut applied = 0;
        while let Some(write) = pending.front() {
            match apply(store, write).await {
                Ok(()) => {}
                // Row already gone (force clear or purge won): nothing to mirror
                Err(AppError::NotFound(msg)) => {
                    debug!(reason = %msg, "Dropping deferred write for missing ticket");
                }
                Err(e) => {
                    self.len.store(pending.len(), Ordering::SeqCst);
                    return Err(e);
                }
            }
            pending.pop_front();
            applied += 1;
        }
        self.len.store(0, Ordering::SeqCst);

        if applied > 0 {
            info!(applied = applied, "Replayed deferred ticket store writes");
        }
        Ok(applied)
    }

    /// Write a status update now, or defer it if the store refuses
    ///
    /// Never fails: the in-memory transition has already happened.
    pub async fn persist(&self, store: &dyn TicketStore, update: StatusUpdate) {
        let write = DeferredWrite::Status(update);
        if self.flush(store).await.is_ok() && apply(store, &write).await.is_ok() {
            return;
        }
        self.defer(write).await;
    }

    /// Delete all tickets of a resource now, or defer it
    ///
    /// # Returns
    /// Rows removed, or `None` if the delete was deferred
    pub async fn delete_all(&self, store: &dyn TicketStore, resource: &str) -> Option<u64> {
        if self.flush(store).await.is_ok() {
            if let Ok(removed) = store.delete_all(resource).await {
                return Some(removed);
            }
        }
        self.defer(DeferredWrite::DeleteAll(resource.to_string()))
            .await;
        None
    }

    async fn defer(&self, write: DeferredWrite) {
        let mut pending = self.pending.lock().await;

        // Collapse to the latest status per ticket
        if let DeferredWrite::Status(update) = &write {
            let queued = pending.iter_mut().find_map(|w| match w {
                DeferredWrite::Status(old) if old.uuid == update.uuid => Some(old),
                _ => None,
            });
            if let Some(old) = queued {
                *old = update.clone();
                return;
            }
        }

        warn!(write = ?write, "Ticket store write deferred");
        pending.push_back(write);
        self.len.store(pending.len(), Ordering::SeqCst);
    }
}

async fn apply(store: &dyn TicketStore, write: &DeferredWrite) -> Result<()> {
    match write {
        DeferredWrite::Status(update) => store.update_status(update).await,
        DeferredWrite::DeleteAll(resource) => store.delete_all(resource).await.map(|_| ()),
    }
}
