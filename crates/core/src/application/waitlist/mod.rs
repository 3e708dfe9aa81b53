//! Waitlist Service - the queue manager
//!
//! Owns every [`TicketQueue`] and drives all ticket transitions. Each queue
//! key has its own async mutex (the per-key section); operations on
//! different keys never contend. Every transition happens under the section
//! and first re-checks the ticket's status, so whichever of release, expiry
//! or force clear gets there first wins and the others become no-ops.
//!
//! Lock order: resource gate -> key section -> store outbox.

pub mod create;
#[cfg(test)]
mod create_test;
mod restore;
#[cfg(test)]
mod tests;

pub use create::CreateTicketRequest;
pub use restore::RestoreReport;

use crate::application::broker::{WaitBroker, WaitOutcome};
use crate::application::config::WaitlistConfig;
use crate::application::expiry::{ExpiryEngine, ExpiryHandler};
use crate::application::outbox::StoreOutbox;
use crate::domain::{QueueKey, ResourceId, Ticket, TicketId, TicketQueue, TicketStatus};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, TicketStore, TimeProvider};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Per-key critical section
struct KeySection {
    queue: TicketQueue,
    /// Set when the section is dropped from the map; lockers must look again
    retired: bool,
}

type Section = Arc<Mutex<KeySection>>;

/// Point-in-time engine counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WaitlistStats {
    pub queue_keys: usize,
    pub queued: usize,
    pub active: usize,
    pub expired: usize,
    pub finished: usize,
    pub deleted: usize,
    pub armed_timers: usize,
    pub waited_tickets: usize,
    pub deferred_writes: usize,
}

pub struct WaitlistService {
    queues: DashMap<QueueKey, Section>,
    index: DashMap<TicketId, QueueKey>,
    /// Creates share a resource's gate, clears take it exclusively
    gates: DashMap<ResourceId, Arc<RwLock<()>>>,
    /// Admission sequence; taken under the key section so it follows creation order
    next_seq: AtomicU64,
    store: Arc<dyn TicketStore>,
    outbox: StoreOutbox,
    expiry: ExpiryEngine,
    broker: WaitBroker,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    config: WaitlistConfig,
}

impl WaitlistService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        config: WaitlistConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let handler: Weak<dyn ExpiryHandler> = weak.clone();
            Self {
                queues: DashMap::new(),
                index: DashMap::new(),
                gates: DashMap::new(),
                next_seq: AtomicU64::new(1),
                store,
                outbox: StoreOutbox::new(),
                expiry: ExpiryEngine::new(handler, Arc::clone(&time_provider)),
                broker: WaitBroker::new(),
                id_provider,
                time_provider,
                config,
            }
        })
    }

    pub fn config(&self) -> &WaitlistConfig {
        &self.config
    }

    /// Create a ticket: active if the key's slot is free, queued otherwise
    ///
    /// The ticket is persisted before it becomes visible; a store failure
    /// leaves no trace in memory.
    ///
    /// # Errors
    /// - `InvalidDeadline` if `expires_at` is not strictly in the future
    /// - `Validation` for malformed key parts
    /// - `StoreUnavailable` if the ticket could not be persisted
    pub async fn create(&self, req: CreateTicketRequest) -> Result<Ticket> {
        create::validate_request(&req)?;
        create::validate_deadline(req.expires_at, self.time_provider.now_millis())?;

        let key = req.key();
        let gate = self.gate(&key.resource);
        let admitting = gate.read().await;
        let mut section = self.lock_key(&key).await;

        let now = self.time_provider.now_millis();
        let status = section.queue.admission_status();
        let mut ticket = Ticket::new(
            self.id_provider.generate_id(),
            &key,
            now,
            req.expires_at,
            status,
        );
        ticket.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        ticket.action = req.action;
        ticket.extra = req.extra;

        // Persist before anything becomes visible
        let persisted: Result<()> = async {
            create::validate_deadline(ticket.expires_at, now)?;
            self.flush_outbox().await?;
            self.store.create_ticket(&ticket).await
        }
        .await;
        if let Err(e) = persisted {
            // Do not leave an empty queue behind
            if section.queue.is_empty() {
                self.retire(&key, section);
                drop(admitting);
                drop(gate);
                self.release_gate(&key.resource);
            }
            return Err(e);
        }

        section.queue.insert(ticket.clone())?;
        self.index.insert(ticket.uuid.clone(), key.clone());
        self.expiry.register(&ticket.uuid, ticket.expires_at)?;
        self.broker.notify(&ticket.uuid, status);

        info!(
            ticket_id = %ticket.uuid,
            queue_key = %key,
            status = %status,
            expires_at = ticket.expires_at,
            pending = section.queue.pending_len(),
            "Ticket created"
        );
        Ok(ticket)
    }

    /// Release an active ticket and promote the next one in line
    ///
    /// # Errors
    /// - `NotFound` for an unknown uuid
    /// - `NotActive` if the ticket does not hold the slot
    /// - `StoreUnavailable` if the release could not be persisted (nothing changes)
    pub async fn release(&self, uuid: &str) -> Result<Ticket> {
        let key = self.key_of(uuid)?;
        let mut section = self
            .lock_existing(&key)
            .await
            .ok_or_else(|| not_found(uuid))?;

        let current = section
            .queue
            .get(uuid)
            .cloned()
            .ok_or_else(|| not_found(uuid))?;
        if current.status != TicketStatus::Active {
            return Err(AppError::NotActive {
                uuid: uuid.to_string(),
                status: current.status,
            });
        }

        let now = self.time_provider.now_millis();
        let mut finished = current;
        finished.finish(now)?;

        // Persist before the slot frees up
        self.flush_outbox().await?;
        self.store.update_status(&finished.status_update()).await?;

        let finished = section.queue.release(uuid, now)?;
        self.expiry.cancel(uuid);
        self.broker.notify(uuid, TicketStatus::Finished);
        info!(ticket_id = %uuid, queue_key = %key, "Ticket released");

        self.promote_next(&mut section.queue, now).await;
        Ok(finished)
    }

    /// Block until the ticket is active
    ///
    /// Returns immediately if the ticket is already active or can no longer
    /// become active.
    ///
    /// # Errors
    /// - `TicketExpired` if the ticket is (or becomes) expired, finished or deleted
    /// - `WaitTimeout` if `timeout` elapses first
    /// - `NotFound` for an unknown uuid
    pub async fn wait(&self, uuid: &str, timeout: Option<Duration>) -> Result<Ticket> {
        let timeout = self.config.wait_timeout(timeout);
        let key = self.key_of(uuid)?;

        // Check-then-register under the section: no transition can slip between
        let mut rx = {
            let section = self
                .lock_existing(&key)
                .await
                .ok_or_else(|| not_found(uuid))?;
            let ticket = section.queue.get(uuid).ok_or_else(|| not_found(uuid))?;
            match ticket.status {
                TicketStatus::Active => return Ok(ticket.clone()),
                TicketStatus::Queued => self.broker.subscribe(uuid, TicketStatus::Queued),
                status => {
                    return Err(AppError::TicketExpired {
                        uuid: uuid.to_string(),
                        status,
                    })
                }
            }
        };

        debug!(
            ticket_id = %uuid,
            timeout_ms = timeout.as_millis() as u64,
            "Waiting for ticket"
        );

        match WaitBroker::wait(&mut rx, timeout).await {
            // Slot may already have been given up again before we got here
            WaitOutcome::Active => match self.get(uuid).await? {
                ticket if ticket.status == TicketStatus::Active => Ok(ticket),
                ticket => Err(AppError::TicketExpired {
                    uuid: uuid.to_string(),
                    status: ticket.status,
                }),
            },
            WaitOutcome::Resolved(status) => Err(AppError::TicketExpired {
                uuid: uuid.to_string(),
                status,
            }),
            WaitOutcome::TimedOut => Err(AppError::WaitTimeout(timeout.as_millis() as u64)),
        }
    }

    /// Current record of a ticket
    pub async fn get(&self, uuid: &str) -> Result<Ticket> {
        let key = self.key_of(uuid)?;
        let section = self
            .lock_existing(&key)
            .await
            .ok_or_else(|| not_found(uuid))?;
        section
            .queue
            .get(uuid)
            .cloned()
            .ok_or_else(|| not_found(uuid))
    }

    /// All non-deleted tickets of a resource, in creation order
    pub async fn list(&self, resource: &str) -> Vec<Ticket> {
        let mut tickets = Vec::new();
        for key in self.keys_of_resource(resource) {
            if let Some(section) = self.lock_existing(&key).await {
                tickets.extend(
                    section
                        .queue
                        .snapshot()
                        .into_iter()
                        .filter(|t| t.status != TicketStatus::Deleted),
                );
            }
        }
        tickets.sort_by(|a, b| a.order().cmp(&b.order()));
        tickets
    }

    /// Operator override: delete every ticket of a resource
    ///
    /// Always succeeds. Waiters are woken with a terminal outcome and timers
    /// cancelled; the store delete is deferred if the store is down. The
    /// deleted tickets remain visible to `get`/`wait` until purged.
    ///
    /// # Returns
    /// Number of tickets cleared from memory
    pub async fn force_clear(&self, resource: &str) -> usize {
        let gate = self.gate(resource);
        let _exclusive = gate.write().await;
        let now = self.time_provider.now_millis();

        let mut cleared = 0;
        for key in self.keys_of_resource(resource) {
            let Some(mut section) = self.lock_existing(&key).await else {
                continue;
            };
            // Tombstones stay indexed until the reaper purges them
            for ticket in section.queue.clear(now) {
                self.expiry.cancel(&ticket.uuid);
                self.broker.notify(&ticket.uuid, TicketStatus::Deleted);
                cleared += 1;
            }
        }

        let store_rows = self
            .outbox
            .delete_all(self.store.as_ref(), resource)
            .await;
        warn!(
            resource = %resource,
            cleared = cleared,
            store_rows = ?store_rows,
            "Force cleared tickets"
        );
        cleared
    }

    /// Delete all tickets of a resource
    ///
    /// Without `force` this only succeeds when no ticket of the resource is
    /// queued or active.
    ///
    /// # Errors
    /// - `QueueBusy` if not forced and some key still has live tickets
    /// - `StoreUnavailable` if not forced and the store delete failed
    pub async fn delete_all(&self, resource: &str, force: bool) -> Result<usize> {
        if force {
            return Ok(self.force_clear(resource).await);
        }

        let gate = self.gate(resource);
        let _exclusive = gate.write().await;

        let mut sections = Vec::new();
        for key in self.keys_of_resource(resource) {
            if let Some(section) = self.lock_existing(&key).await {
                if section.queue.is_contended() {
                    return Err(AppError::QueueBusy(format!(
                        "{} has live tickets (force required)",
                        key
                    )));
                }
                sections.push(section);
            }
        }

        self.flush_outbox().await?;
        self.store.delete_all(resource).await?;

        let now = self.time_provider.now_millis();
        let mut removed = 0;
        for mut section in sections {
            removed += section.queue.clear(now).len();
        }

        info!(resource = %resource, removed = removed, "Deleted tickets");
        Ok(removed)
    }

    /// Drop terminal tickets last updated before `before_millis`
    ///
    /// Queues left without tickets are destroyed.
    ///
    /// # Returns
    /// Number of tickets purged from memory
    pub async fn purge_terminal(&self, before_millis: i64) -> Result<usize> {
        let keys: Vec<QueueKey> = self.queues.iter().map(|e| e.key().clone()).collect();

        let mut purged = 0;
        for key in keys {
            let Some(mut section) = self.lock_existing(&key).await else {
                continue;
            };
            for uuid in section.queue.purge_terminal(before_millis) {
                self.index.remove(&uuid);
                purged += 1;
            }
            if section.queue.is_empty() {
                let resource = key.resource.clone();
                self.retire(&key, section);
                self.release_gate(&resource);
            }
        }

        self.flush_outbox().await?;
        let rows = self.store.purge_terminal(before_millis).await?;
        debug!(purged = purged, store_rows = rows, "Purged terminal tickets");
        Ok(purged)
    }

    /// Replay deferred store writes
    ///
    /// # Returns
    /// Number of writes applied
    pub async fn sync_store(&self) -> Result<usize> {
        self.outbox
            .flush(self.store.as_ref())
            .await
            .map_err(into_store_error)
    }

    pub async fn stats(&self) -> WaitlistStats {
        let mut stats = WaitlistStats {
            armed_timers: self.expiry.armed_count(),
            waited_tickets: self.broker.tracked(),
            deferred_writes: self.outbox.len(),
            ..Default::default()
        };

        let keys: Vec<QueueKey> = self.queues.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            let Some(section) = self.lock_existing(&key).await else {
                continue;
            };
            stats.queue_keys += 1;
            for ticket in section.queue.tickets() {
                match ticket.status {
                    TicketStatus::Queued => stats.queued += 1,
                    TicketStatus::Active => stats.active += 1,
                    TicketStatus::Expired => stats.expired += 1,
                    TicketStatus::Finished => stats.finished += 1,
                    TicketStatus::Deleted => stats.deleted += 1,
                }
            }
        }
        stats
    }

    /// Verify every queue's invariants (diagnostics and tests)
    pub async fn check_invariants(&self) -> Result<()> {
        let keys: Vec<QueueKey> = self.queues.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some(section) = self.lock_existing(&key).await {
                section.queue.check_invariants()?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transitions (caller holds the key section)
    // ------------------------------------------------------------------

    /// Fill a vacant slot with the next queued ticket
    ///
    /// Heads whose deadline already passed (timer not delivered yet) are
    /// expired instead of being activated.
    async fn promote_next(&self, queue: &mut TicketQueue, now: i64) -> Option<Ticket> {
        while queue.is_vacant() {
            let head = queue.head()?;
            if head.expires_at <= now {
                let uuid = head.uuid.clone();
                if let Some(expired) = queue.expire(&uuid, now) {
                    self.expiry.cancel(&uuid);
                    self.outbox
                        .persist(self.store.as_ref(), expired.status_update())
                        .await;
                    self.broker.notify(&uuid, TicketStatus::Expired);
                    info!(ticket_id = %uuid, "Queued ticket expired before promotion");
                }
                continue;
            }

            let promoted = queue.promote(now)?;
            self.outbox
                .persist(self.store.as_ref(), promoted.status_update())
                .await;
            self.broker.notify(&promoted.uuid, TicketStatus::Active);
            info!(
                ticket_id = %promoted.uuid,
                queue_key = %queue.key(),
                pending = queue.pending_len(),
                "Ticket promoted to active"
            );
            return Some(promoted);
        }
        None
    }

    // ------------------------------------------------------------------
    // Section bookkeeping
    // ------------------------------------------------------------------

    /// Lock the section of a key, creating it on first use
    async fn lock_key(&self, key: &QueueKey) -> OwnedMutexGuard<KeySection> {
        loop {
            let section = self
                .queues
                .entry(key.clone())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(KeySection {
                        queue: TicketQueue::new(key.clone()),
                        retired: false,
                    }))
                })
                .value()
                .clone();
            let guard = section.lock_owned().await;
            if !guard.retired {
                return guard;
            }
        }
    }

    /// Lock the section of a key if it exists
    async fn lock_existing(&self, key: &QueueKey) -> Option<OwnedMutexGuard<KeySection>> {
        loop {
            let section = self.queues.get(key)?.value().clone();
            let guard = section.lock_owned().await;
            if !guard.retired {
                return Some(guard);
            }
        }
    }

    /// Destroy a key's section while holding it
    fn retire(&self, key: &QueueKey, mut section: OwnedMutexGuard<KeySection>) {
        section.retired = true;
        let mutex = Arc::clone(OwnedMutexGuard::mutex(&section));
        self.queues
            .remove_if(key, |_, current| Arc::ptr_eq(current, &mutex));
    }

    fn gate(&self, resource: &str) -> Arc<RwLock<()>> {
        self.gates
            .entry(resource.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Forget a resource's gate once it has no keys and nobody holds it
    fn release_gate(&self, resource: &str) {
        if self.queues.iter().any(|e| e.key().resource == resource) {
            return;
        }
        self.gates
            .remove_if(resource, |_, gate| Arc::strong_count(gate) == 1);
    }

    fn key_of(&self, uuid: &str) -> Result<QueueKey> {
        self.index
            .get(uuid)
            .map(|key| key.value().clone())
            .ok_or_else(|| not_found(uuid))
    }

    fn keys_of_resource(&self, resource: &str) -> Vec<QueueKey> {
        self.queues
            .iter()
            .filter(|e| e.key().resource == resource)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Deferred writes go first so the store never sees an older status last
    async fn flush_outbox(&self) -> Result<()> {
        self.sync_store().await.map(|_| ())
    }
}

#[async_trait]
impl ExpiryHandler for WaitlistService {
    async fn on_expire(&self, uuid: &str) {
        let Some(key) = self.index.get(uuid).map(|k| k.value().clone()) else {
            debug!(ticket_id = %uuid, "Expiry for untracked ticket ignored");
            return;
        };
        let Some(mut section) = self.lock_existing(&key).await else {
            return;
        };
        let Some(ticket) = section.queue.get(uuid).cloned() else {
            return;
        };

        if ticket.status.is_terminal() {
            debug!(
                ticket_id = %uuid,
                status = %ticket.status,
                "Expiry lost the race, ticket already left the queue"
            );
            return;
        }

        let now = self.time_provider.now_millis();
        if now < ticket.expires_at {
            // Timer ran early against the wall clock; never expire before the deadline
            self.expiry.rearm(uuid, ticket.expires_at);
            return;
        }

        let Some(expired) = section.queue.expire(uuid, now) else {
            return;
        };
        self.outbox
            .persist(self.store.as_ref(), expired.status_update())
            .await;
        self.broker.notify(uuid, TicketStatus::Expired);
        info!(
            ticket_id = %uuid,
            queue_key = %key,
            was = %ticket.status,
            "Ticket expired"
        );

        if ticket.status == TicketStatus::Active {
            self.promote_next(&mut section.queue, now).await;
        }
    }
}

fn not_found(uuid: &str) -> AppError {
    AppError::NotFound(format!("Ticket {} not found", uuid))
}

fn into_store_error(err: AppError) -> AppError {
    match err {
        AppError::StoreUnavailable(_) => err,
        other => AppError::StoreUnavailable(other.to_string()),
    }
}
