// Startup restore: rebuild queues from the durable store

use super::WaitlistService;
use crate::domain::{QueueKey, Ticket, TicketStatus};
use crate::error::Result;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

/// Outcome of a startup restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Live tickets put back in their queues with a timer
    pub restored: usize,
    /// Live tickets whose deadline passed while the process was down
    pub expired: usize,
    /// Queues whose slot was filled during restore
    pub promoted: usize,
}

impl WaitlistService {
    /// Rebuild in-memory queues from the live tickets in the store
    ///
    /// Call once on startup, before serving requests.
    /// 1. Persisted active tickets keep their slot
    /// 2. Tickets past their deadline are expired
    /// 3. A second active ticket for the same key (should not happen) is expired
    /// 4. Vacant slots are filled from the pending queue in FIFO order
    pub async fn restore(&self) -> Result<RestoreReport> {
        let live = self.store.list_live().await?;
        let now = self.time_provider.now_millis();

        // New tickets must sort after every restored one
        if let Some(max_seq) = live.iter().map(|t| t.seq).max() {
            self.next_seq.fetch_max(max_seq + 1, Ordering::Relaxed);
        }

        let mut by_key: BTreeMap<QueueKey, Vec<Ticket>> = BTreeMap::new();
        for ticket in live {
            by_key.entry(ticket.key()).or_default().push(ticket);
        }

        let mut report = RestoreReport::default();
        for (key, mut tickets) in by_key {
            tickets.sort_by(|a, b| {
                let a_rank = (a.status != TicketStatus::Active, a.order());
                let b_rank = (b.status != TicketStatus::Active, b.order());
                a_rank.cmp(&b_rank)
            });

            let mut section = self.lock_key(&key).await;
            for mut ticket in tickets {
                if section.queue.get(&ticket.uuid).is_some() {
                    continue;
                }

                let stale = ticket.expires_at <= now;
                let duplicate_holder =
                    ticket.status == TicketStatus::Active && !section.queue.is_vacant();
                if stale || duplicate_holder {
                    if duplicate_holder {
                        warn!(
                            ticket_id = %ticket.uuid,
                            queue_key = %key,
                            "Second active ticket found on restore, expiring it"
                        );
                    }
                    ticket.expire(now)?;
                    self.outbox
                        .persist(self.store.as_ref(), ticket.status_update())
                        .await;
                    self.index.insert(ticket.uuid.clone(), key.clone());
                    section.queue.insert(ticket)?;
                    report.expired += 1;
                    continue;
                }

                let uuid = ticket.uuid.clone();
                let expires_at = ticket.expires_at;
                section.queue.insert(ticket)?;
                self.index.insert(uuid.clone(), key.clone());
                self.expiry.register(&uuid, expires_at)?;
                report.restored += 1;
            }

            if self.promote_next(&mut section.queue, now).await.is_some() {
                report.promoted += 1;
            }
        }

        info!(
            restored = report.restored,
            expired = report.expired,
            promoted = report.promoted,
            "Waitlist restored from store"
        );
        Ok(report)
    }
}
