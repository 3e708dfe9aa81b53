// Per-key Queue State
//
// Pure state machine: no I/O, no clocks. Callers pass `now` explicitly and
// hold the per-key section while mutating.

use crate::domain::error::{DomainError, Result};
use crate::domain::ticket::{QueueKey, Ticket, TicketId, TicketStatus};
use std::collections::{BTreeSet, HashMap};

/// Position in the pending sequence: (created_at, seq, uuid)
///
/// Derived `Ord` gives FIFO by creation time; the admission sequence
/// orders tickets from the same millisecond, uuid only breaks what is left.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PendingEntry(pub i64, pub u64, pub TicketId);

impl PendingEntry {
    fn of(ticket: &Ticket) -> Self {
        Self(ticket.created_at, ticket.seq, ticket.uuid.clone())
    }
}

/// One queue per queue key
#[derive(Debug)]
pub struct TicketQueue {
    key: QueueKey,
    active: Option<TicketId>,
    pending: BTreeSet<PendingEntry>,
    /// Every ticket of this key that has not been purged, by uuid
    tickets: HashMap<TicketId, Ticket>,
}

impl TicketQueue {
    pub fn new(key: QueueKey) -> Self {
        Self {
            key,
            active: None,
            pending: BTreeSet::new(),
            tickets: HashMap::new(),
        }
    }

    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    pub fn is_vacant(&self) -> bool {
        self.active.is_none()
    }

    pub fn active_id(&self) -> Option<&TicketId> {
        self.active.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Live tickets (active or queued) present
    pub fn is_contended(&self) -> bool {
        self.active.is_some() || !self.pending.is_empty()
    }

    /// No tickets tracked at all
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn get(&self, uuid: &str) -> Option<&Ticket> {
        self.tickets.get(uuid)
    }

    pub fn tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.tickets.values()
    }

    /// Next ticket in line for the slot
    pub fn head(&self) -> Option<&Ticket> {
        self.pending
            .first()
            .and_then(|PendingEntry(_, _, uuid)| self.tickets.get(uuid))
    }

    /// Status a newly created ticket would be admitted with
    pub fn admission_status(&self) -> TicketStatus {
        if self.is_vacant() {
            TicketStatus::Active
        } else {
            TicketStatus::Queued
        }
    }

    /// Insert a ticket according to its current status
    ///
    /// Active tickets take the slot, queued ones join `pending`, terminal
    /// ones are only tracked for listing.
    pub fn insert(&mut self, ticket: Ticket) -> Result<()> {
        if ticket.key() != self.key {
            return Err(DomainError::ValidationError(format!(
                "ticket {} belongs to {}, not {}",
                ticket.uuid,
                ticket.key(),
                self.key
            )));
        }

        match ticket.status {
            TicketStatus::Active => {
                if let Some(current) = &self.active {
                    return Err(DomainError::SlotOccupied(format!(
                        "{} (held by {})",
                        self.key, current
                    )));
                }
                self.active = Some(ticket.uuid.clone());
            }
            TicketStatus::Queued => {
                self.pending.insert(PendingEntry::of(&ticket));
            }
            _ => {}
        }

        self.tickets.insert(ticket.uuid.clone(), ticket);
        Ok(())
    }

    /// active -> finished; frees the slot without promoting
    pub fn release(&mut self, uuid: &str, now_millis: i64) -> Result<Ticket> {
        if self.active.as_deref() != Some(uuid) {
            let status = self
                .tickets
                .get(uuid)
                .map(|t| t.status.to_string())
                .ok_or_else(|| DomainError::TicketNotFound(uuid.to_string()))?;
            return Err(DomainError::InvalidStateTransition {
                from: status,
                to: TicketStatus::Finished.to_string(),
            });
        }

        let ticket = self
            .tickets
            .get_mut(uuid)
            .ok_or_else(|| DomainError::TicketNotFound(uuid.to_string()))?;
        ticket.finish(now_millis)?;
        self.active = None;
        Ok(ticket.clone())
    }

    /// queued | active -> expired
    ///
    /// Returns `None` when the ticket already left the live states (a lost
    /// race against release or force clear).
    pub fn expire(&mut self, uuid: &str, now_millis: i64) -> Option<Ticket> {
        let ticket = self.tickets.get_mut(uuid)?;
        let was = ticket.status;
        ticket.expire(now_millis).ok()?;

        match was {
            TicketStatus::Active => self.active = None,
            _ => {
                self.pending.remove(&PendingEntry::of(ticket));
            }
        }
        Some(ticket.clone())
    }

    /// Fill a vacant slot with the head of `pending`
    pub fn promote(&mut self, now_millis: i64) -> Option<Ticket> {
        if !self.is_vacant() {
            return None;
        }
        let PendingEntry(_, _, uuid) = self.pending.pop_first()?;
        let ticket = self.tickets.get_mut(&uuid)?;
        // pending only ever holds queued tickets
        ticket.activate(now_millis).ok()?;
        self.active = Some(uuid);
        Some(ticket.clone())
    }

    /// Mark every ticket deleted and free the slot
    ///
    /// Deleted tickets stay tracked as tombstones until purged, so lookups
    /// still report their final status. Returns the newly deleted tickets.
    pub fn clear(&mut self, now_millis: i64) -> Vec<Ticket> {
        self.active = None;
        self.pending.clear();
        let mut cleared: Vec<Ticket> = self
            .tickets
            .values_mut()
            .filter(|t| t.status != TicketStatus::Deleted)
            .map(|t| {
                t.delete(now_millis);
                t.clone()
            })
            .collect();
        cleared.sort_by(|a, b| a.order().cmp(&b.order()));
        cleared
    }

    /// Drop terminal tickets last touched before `before_millis`
    pub fn purge_terminal(&mut self, before_millis: i64) -> Vec<TicketId> {
        let stale: Vec<TicketId> = self
            .tickets
            .values()
            .filter(|t| t.status.is_terminal() && t.updated_at < before_millis)
            .map(|t| t.uuid.clone())
            .collect();
        for uuid in &stale {
            self.tickets.remove(uuid);
        }
        stale
    }

    /// Tickets in creation order
    pub fn snapshot(&self) -> Vec<Ticket> {
        let mut out: Vec<Ticket> = self.tickets.values().cloned().collect();
        out.sort_by(|a, b| a.order().cmp(&b.order()));
        out
    }

    /// Verify the queue invariants
    ///
    /// 1. at most one active ticket, and it is the one in the slot
    /// 2. `pending` holds exactly the queued tickets
    /// 3. a vacant slot never coexists with pending tickets
    pub fn check_invariants(&self) -> Result<()> {
        let active: Vec<&Ticket> = self
            .tickets
            .values()
            .filter(|t| t.status == TicketStatus::Active)
            .collect();
        if active.len() > 1 {
            return Err(DomainError::InvariantViolation(format!(
                "{} active tickets on {}",
                active.len(),
                self.key
            )));
        }
        if active.first().map(|t| &t.uuid) != self.active.as_ref() {
            return Err(DomainError::InvariantViolation(format!(
                "slot of {} disagrees with ticket statuses",
                self.key
            )));
        }

        let queued = self
            .tickets
            .values()
            .filter(|t| t.status == TicketStatus::Queued)
            .count();
        let pending_ok = self.pending.iter().all(|PendingEntry(_, _, uuid)| {
            self.tickets
                .get(uuid)
                .is_some_and(|t| t.status == TicketStatus::Queued)
        });
        if queued != self.pending.len() || !pending_ok {
            return Err(DomainError::InvariantViolation(format!(
                "pending set of {} out of sync",
                self.key
            )));
        }

        if self.active.is_none() && !self.pending.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "{} has {} pending tickets but a vacant slot",
                self.key,
                self.pending.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> QueueKey {
        QueueKey::new("node-1", "vm", "123")
    }

    fn admit(q: &mut TicketQueue, uuid: &str, created_at: i64) -> TicketStatus {
        let status = q.admission_status();
        q.insert(Ticket::new(uuid, &key(), created_at, created_at + 10_000, status))
            .unwrap();
        status
    }

    #[test]
    fn test_first_ticket_active_rest_queued() {
        let mut q = TicketQueue::new(key());
        assert_eq!(admit(&mut q, "a", 1), TicketStatus::Active);
        assert_eq!(admit(&mut q, "b", 2), TicketStatus::Queued);
        assert_eq!(admit(&mut q, "c", 3), TicketStatus::Queued);

        assert_eq!(q.active_id().map(String::as_str), Some("a"));
        assert_eq!(q.pending_len(), 2);
        q.check_invariants().unwrap();
    }

    #[test]
    fn test_release_then_promote_in_fifo_order() {
        let mut q = TicketQueue::new(key());
        admit(&mut q, "a", 1);
        admit(&mut q, "b", 2);
        admit(&mut q, "c", 3);

        let released = q.release("a", 10).unwrap();
        assert_eq!(released.status, TicketStatus::Finished);

        let promoted = q.promote(10).unwrap();
        assert_eq!(promoted.uuid, "b");
        assert_eq!(promoted.activated_at, Some(10));
        q.check_invariants().unwrap();
    }

    #[test]
    fn test_equal_created_at_breaks_by_uuid() {
        let mut q = TicketQueue::new(key());
        admit(&mut q, "holder", 1);
        admit(&mut q, "zeta", 5);
        admit(&mut q, "alpha", 5);

        q.release("holder", 6).unwrap();
        assert_eq!(q.promote(6).unwrap().uuid, "alpha");
    }

    #[test]
    fn test_release_non_active_is_rejected() {
        let mut q = TicketQueue::new(key());
        admit(&mut q, "a", 1);
        admit(&mut q, "b", 2);

        assert!(matches!(
            q.release("b", 3),
            Err(DomainError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            q.release("missing", 3),
            Err(DomainError::TicketNotFound(_))
        ));
        assert_eq!(q.active_id().map(String::as_str), Some("a"));
    }

    #[test]
    fn test_expire_queued_only_removes_itself() {
        let mut q = TicketQueue::new(key());
        admit(&mut q, "a", 1);
        admit(&mut q, "b", 2);
        admit(&mut q, "c", 3);

        let expired = q.expire("b", 4).unwrap();
        assert_eq!(expired.status, TicketStatus::Expired);
        assert_eq!(q.active_id().map(String::as_str), Some("a"));
        assert_eq!(q.pending_len(), 1);
        assert!(q.promote(4).is_none(), "slot still held by a");
        q.check_invariants().unwrap();
    }

    #[test]
    fn test_expire_is_noop_after_release() {
        let mut q = TicketQueue::new(key());
        admit(&mut q, "a", 1);
        q.release("a", 2).unwrap();

        assert!(q.expire("a", 3).is_none());
        assert_eq!(q.get("a").unwrap().status, TicketStatus::Finished);
    }

    #[test]
    fn test_clear_deletes_everything() {
        let mut q = TicketQueue::new(key());
        admit(&mut q, "a", 1);
        admit(&mut q, "b", 2);

        let cleared = q.clear(9);
        assert_eq!(cleared.len(), 2);
        assert!(cleared.iter().all(|t| t.status == TicketStatus::Deleted));
        assert!(q.is_vacant());
        assert!(!q.is_contended());

        // Tombstones answer lookups until purged
        assert_eq!(q.get("b").unwrap().status, TicketStatus::Deleted);
        assert!(q.clear(10).is_empty());
        assert_eq!(q.purge_terminal(10).len(), 2);
        assert!(q.is_empty());
        q.check_invariants().unwrap();
    }

    #[test]
    fn test_purge_terminal_keeps_live_and_recent() {
        let mut q = TicketQueue::new(key());
        admit(&mut q, "a", 1);
        admit(&mut q, "b", 2);
        admit(&mut q, "c", 3);
        q.release("a", 100).unwrap();
        q.promote(100);
        q.expire("c", 500);

        let purged = q.purge_terminal(200);
        assert_eq!(purged, vec!["a".to_string()]);
        assert!(q.get("c").is_some());
        assert!(q.get("b").is_some());
    }

    #[test]
    fn test_insert_second_active_is_rejected() {
        let mut q = TicketQueue::new(key());
        admit(&mut q, "a", 1);
        let rogue = Ticket::new("b", &key(), 2, 100, TicketStatus::Active);
        assert!(matches!(q.insert(rogue), Err(DomainError::SlotOccupied(_))));
    }
}
