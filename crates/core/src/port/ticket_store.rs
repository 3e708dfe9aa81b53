// Ticket Store Port (Interface)
//
// Durable mirror of ticket state. The scheduling engine writes to it on every
// transition and only reads it back on restore.

use crate::domain::{StatusUpdate, Ticket, TicketId};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for ticket persistence
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert a new ticket
    async fn create_ticket(&self, ticket: &Ticket) -> Result<()>;

    /// Mirror a status transition
    async fn update_status(&self, update: &StatusUpdate) -> Result<()>;

    /// Find ticket by uuid
    async fn find_by_id(&self, uuid: &TicketId) -> Result<Option<Ticket>>;

    /// All stored tickets of a resource, in creation order
    async fn list_by_resource(&self, resource: &str) -> Result<Vec<Ticket>>;

    /// All queued or active tickets, in creation order (for restore)
    async fn list_live(&self) -> Result<Vec<Ticket>>;

    /// Remove every ticket of a resource
    ///
    /// # Returns
    /// Number of tickets removed
    async fn delete_all(&self, resource: &str) -> Result<u64>;

    /// Remove terminal tickets last updated before `before_millis`
    ///
    /// # Returns
    /// Number of tickets removed
    async fn purge_terminal(&self, before_millis: i64) -> Result<u64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory TicketStore with failure injection
    #[derive(Default)]
    pub struct InMemoryTicketStore {
        tickets: Mutex<HashMap<TicketId, Ticket>>,
        unavailable: AtomicBool,
        fail_next: AtomicUsize,
        writes: AtomicUsize,
    }

    impl InMemoryTicketStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every call until switched back
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Fail the next `n` calls
        pub fn fail_next(&self, n: usize) {
            self.fail_next.store(n, Ordering::SeqCst);
        }

        /// Successful write calls so far
        pub fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        pub fn get(&self, uuid: &str) -> Option<Ticket> {
            self.tickets.lock().unwrap().get(uuid).cloned()
        }

        pub fn len(&self) -> usize {
            self.tickets.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Seed a ticket directly (bypasses failure injection)
        pub fn seed(&self, ticket: Ticket) {
            self.tickets
                .lock()
                .unwrap()
                .insert(ticket.uuid.clone(), ticket);
        }

        fn check(&self) -> Result<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::StoreUnavailable("store offline".to_string()));
            }
            let armed = self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if armed.is_ok() {
                return Err(AppError::StoreUnavailable("injected failure".to_string()));
            }
            Ok(())
        }

        fn sorted(mut tickets: Vec<Ticket>) -> Vec<Ticket> {
            tickets.sort_by(|a, b| a.order().cmp(&b.order()));
            tickets
        }
    }

    #[async_trait]
    impl TicketStore for InMemoryTicketStore {
        async fn create_ticket(&self, ticket: &Ticket) -> Result<()> {
            self.check()?;
            let mut tickets = self.tickets.lock().unwrap();
            if tickets.contains_key(&ticket.uuid) {
                return Err(AppError::Internal(format!(
                    "duplicate ticket {}",
                    ticket.uuid
                )));
            }
            tickets.insert(ticket.uuid.clone(), ticket.clone());
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn update_status(&self, update: &StatusUpdate) -> Result<()> {
            self.check()?;
            let mut tickets = self.tickets.lock().unwrap();
            let ticket = tickets
                .get_mut(&update.uuid)
                .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", update.uuid)))?;
            ticket.status = update.status;
            ticket.activated_at = update.activated_at;
            ticket.updated_at = update.updated_at;
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn find_by_id(&self, uuid: &TicketId) -> Result<Option<Ticket>> {
            self.check()?;
            Ok(self.get(uuid))
        }

        async fn list_by_resource(&self, resource: &str) -> Result<Vec<Ticket>> {
            self.check()?;
            let tickets = self.tickets.lock().unwrap();
            Ok(Self::sorted(
                tickets
                    .values()
                    .filter(|t| t.resource == resource)
                    .cloned()
                    .collect(),
            ))
        }

        async fn list_live(&self) -> Result<Vec<Ticket>> {
            self.check()?;
            let tickets = self.tickets.lock().unwrap();
            Ok(Self::sorted(
                tickets
                    .values()
                    .filter(|t| t.status.is_live())
                    .cloned()
                    .collect(),
            ))
        }

        async fn delete_all(&self, resource: &str) -> Result<u64> {
            self.check()?;
            let mut tickets = self.tickets.lock().unwrap();
            let before = tickets.len();
            tickets.retain(|_, t| t.resource != resource);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok((before - tickets.len()) as u64)
        }

        async fn purge_terminal(&self, before_millis: i64) -> Result<u64> {
            self.check()?;
            let mut tickets = self.tickets.lock().unwrap();
            let before = tickets.len();
            tickets.retain(|_, t| !(t.status.is_terminal() && t.updated_at < before_millis));
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok((before - tickets.len()) as u64)
        }
    }
}
