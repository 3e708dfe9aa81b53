//! Wait/Notify Broker
//!
//! Lets callers block until a queued ticket leaves the `queued` state.
//!
//! Each waited-on ticket gets one `watch` channel holding its latest status.
//! Registration happens under the same per-key section the queue manager
//! uses for transitions, so a transition can never slip in between "check
//! status" and "subscribe". The channel keeps the last value, which means a
//! waiter that subscribes late still observes the final outcome.

use crate::domain::{TicketId, TicketStatus};
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// How a wait resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Ticket holds the slot
    Active,
    /// Ticket can no longer become active (expired, finished or deleted)
    Resolved(TicketStatus),
    /// Caller's own deadline elapsed first
    TimedOut,
}

impl WaitOutcome {
    fn from_status(status: TicketStatus) -> Self {
        match status {
            TicketStatus::Active => WaitOutcome::Active,
            other => WaitOutcome::Resolved(other),
        }
    }
}

#[derive(Default)]
pub struct WaitBroker {
    channels: DashMap<TicketId, watch::Sender<TicketStatus>>,
}

impl WaitBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in a queued ticket
    ///
    /// Must be called while holding the ticket's per-key section.
    pub fn subscribe(&self, uuid: &str, current: TicketStatus) -> watch::Receiver<TicketStatus> {
        self.channels
            .entry(uuid.to_string())
            .or_insert_with(|| watch::channel(current).0)
            .subscribe()
    }

    /// Publish a ticket transition to its waiters
    ///
    /// Once a ticket is no longer queued its channel is dropped: every later
    /// waiter sees the status directly and never subscribes.
    pub fn notify(&self, uuid: &str, status: TicketStatus) {
        if status == TicketStatus::Queued {
            return;
        }
        if let Some((_, tx)) = self.channels.remove(uuid) {
            let waiters = tx.receiver_count();
            tx.send_replace(status);
            debug!(ticket_id = %uuid, status = %status, waiters = waiters, "Woke ticket waiters");
        }
    }

    /// Current waiters on a ticket
    pub fn waiter_count(&self, uuid: &str) -> usize {
        self.channels
            .get(uuid)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Tickets with at least one registered channel
    pub fn tracked(&self) -> usize {
        self.channels.len()
    }

    /// Suspend until the ticket leaves `queued` or `timeout` elapses
    ///
    /// Dropping the receiver afterwards deregisters the caller.
    pub async fn wait(rx: &mut watch::Receiver<TicketStatus>, timeout: Duration) -> WaitOutcome {
        let resolved = tokio::time::timeout(timeout, rx.wait_for(|s| *s != TicketStatus::Queued))
            .await
            .map(|r| r.map(|status| *status));

        match resolved {
            Err(_) => WaitOutcome::TimedOut,
            Ok(Ok(status)) => WaitOutcome::from_status(status),
            // Sender gone without a final value: the engine itself went away
            Ok(Err(_)) => match *rx.borrow() {
                TicketStatus::Queued => WaitOutcome::Resolved(TicketStatus::Deleted),
                other => WaitOutcome::from_status(other),
            },
        }
    }
}
