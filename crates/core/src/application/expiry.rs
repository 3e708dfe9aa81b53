//! Expiry Engine
//!
//! One deferred timer task per live ticket. When a timer fires the engine
//! hands the ticket to its [`ExpiryHandler`] (the queue manager), which owns
//! the actual transition and decides whether it is still relevant.
//!
//! Timely cancellation is an optimization only: the handler treats an expiry
//! for a ticket that already left `queued`/`active` as a no-op.

use crate::domain::TicketId;
use crate::error::{AppError, Result};
use crate::port::TimeProvider;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

/// Receiver of deadline events
#[async_trait]
pub trait ExpiryHandler: Send + Sync {
    /// Called at (or after) the ticket's deadline
    async fn on_expire(&self, uuid: &str);
}

struct ArmedTimer {
    generation: u64,
    handle: AbortHandle,
}

pub struct ExpiryEngine {
    handler: Weak<dyn ExpiryHandler>,
    time_provider: Arc<dyn TimeProvider>,
    armed: Arc<DashMap<TicketId, ArmedTimer>>,
    generation: AtomicU64,
}

impl ExpiryEngine {
    /// Create an engine delivering deadline events to `handler`
    ///
    /// The handler is held weakly so the engine can live inside it.
    pub fn new(handler: Weak<dyn ExpiryHandler>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            handler,
            time_provider,
            armed: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Schedule the deadline of a ticket
    ///
    /// # Errors
    /// `AppError::Internal` if the ticket already has an armed timer: a
    /// ticket's deadline is immutable after creation.
    pub fn register(&self, uuid: &str, expires_at: i64) -> Result<()> {
        if self.armed.contains_key(uuid) {
            return Err(AppError::Internal(format!(
                "expiry already registered for ticket {}",
                uuid
            )));
        }
        self.arm(uuid, expires_at);
        Ok(())
    }

    /// Re-arm a ticket whose timer fired before its deadline (clock jitter)
    pub fn rearm(&self, uuid: &str, expires_at: i64) {
        self.arm(uuid, expires_at);
    }

    /// Drop a pending schedule
    ///
    /// # Returns
    /// true if a timer was armed
    pub fn cancel(&self, uuid: &str) -> bool {
        match self.armed.remove(uuid) {
            Some((_, timer)) => {
                timer.handle.abort();
                trace!(ticket_id = %uuid, "Expiry timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, uuid: &str) -> bool {
        self.armed.contains_key(uuid)
    }

    /// Number of armed timers
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    fn arm(&self, uuid: &str, expires_at: i64) {
        let delay_ms = (expires_at - self.time_provider.now_millis()).max(0) as u64;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);

        let handler = self.handler.clone();
        let armed = Arc::clone(&self.armed);
        let ticket_id = uuid.to_string();
        let (ready_tx, ready_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            // Entry must be in the map before the task may disarm it
            if ready_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            // Disarm first: once the handler runs nobody may abort this task
            armed.remove_if(&ticket_id, |_, timer| timer.generation == generation);

            match handler.upgrade() {
                Some(handler) => handler.on_expire(&ticket_id).await,
                None => debug!(ticket_id = %ticket_id, "Expiry fired after engine shutdown"),
            }
        });

        let previous = self.armed.insert(
            uuid.to_string(),
            ArmedTimer {
                generation,
                handle: task.abort_handle(),
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        let _ = ready_tx.send(());
        trace!(ticket_id = %uuid, delay_ms = delay_ms, "Expiry timer armed");
    }
}

impl Drop for ExpiryEngine {
    fn drop(&mut self) {
        for timer in self.armed.iter() {
            timer.handle.abort();
        }
    }
}
