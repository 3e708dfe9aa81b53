// Ticket Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Ticket ID (UUID v4)
pub type TicketId = String;

/// Resource identifier (e.g. a compute node uuid)
pub type ResourceId = String;

/// Contention group: all tickets sharing a key compete for one slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueKey {
    pub resource: ResourceId,
    pub scope: String,
    pub id: String,
}

impl QueueKey {
    pub fn new(
        resource: impl Into<String>,
        scope: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            scope: scope.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for QueueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.resource, self.scope, self.id)
    }
}

/// Ticket Status
///
/// Transitions are monotonic:
/// `queued -> active -> {finished, expired}` or `queued -> expired`.
/// `deleted` is reachable from any state through force clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Queued,
    Active,
    Expired,
    Finished,
    Deleted,
}

impl TicketStatus {
    /// Queued or active: the ticket still wants (or holds) the slot
    pub fn is_live(self) -> bool {
        matches!(self, TicketStatus::Queued | TicketStatus::Active)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Queued => "queued",
            TicketStatus::Active => "active",
            TicketStatus::Expired => "expired",
            TicketStatus::Finished => "finished",
            TicketStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(TicketStatus::Queued),
            "active" => Ok(TicketStatus::Active),
            "expired" => Ok(TicketStatus::Expired),
            "finished" => Ok(TicketStatus::Finished),
            "deleted" => Ok(TicketStatus::Deleted),
            other => Err(DomainError::ValidationError(format!(
                "unknown ticket status '{}'",
                other
            ))),
        }
    }
}

/// Ticket Entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub uuid: TicketId,

    // Queue key
    pub resource: ResourceId,
    pub scope: String,
    pub id: String,

    pub status: TicketStatus,

    pub created_at: i64, // epoch ms
    /// Admission sequence, orders tickets created in the same millisecond
    #[serde(default)]
    pub seq: u64,
    pub expires_at: i64, // epoch ms
    pub updated_at: i64, // epoch ms
    pub activated_at: Option<i64>,

    /// Free-form label of the guarded operation
    pub action: Option<String>,
    /// Opaque client data, echoed back
    pub extra: serde_json::Value,
}

impl Ticket {
    /// Create a new ticket in the given admission status
    ///
    /// `status` must be `Queued` or `Active`; an active ticket is stamped
    /// with `activated_at = created_at`.
    pub fn new(
        uuid: impl Into<String>,
        key: &QueueKey,
        created_at: i64,
        expires_at: i64,
        status: TicketStatus,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            resource: key.resource.clone(),
            scope: key.scope.clone(),
            id: key.id.clone(),
            status,
            created_at,
            seq: 0,
            expires_at,
            updated_at: created_at,
            activated_at: (status == TicketStatus::Active).then_some(created_at),
            action: None,
            extra: serde_json::Value::Null,
        }
    }

    pub fn key(&self) -> QueueKey {
        QueueKey::new(&self.resource, &self.scope, &self.id)
    }

    /// FIFO position within the queue key
    pub fn order(&self) -> (i64, u64, &str) {
        (self.created_at, self.seq, self.uuid.as_str())
    }

    /// Durable mirror of this ticket's current status
    pub fn status_update(&self) -> StatusUpdate {
        StatusUpdate {
            uuid: self.uuid.clone(),
            status: self.status,
            activated_at: self.activated_at,
            updated_at: self.updated_at,
        }
    }

    /// queued -> active
    pub fn activate(&mut self, now_millis: i64) -> Result<()> {
        self.transition(&[TicketStatus::Queued], TicketStatus::Active, now_millis)?;
        self.activated_at = Some(now_millis);
        Ok(())
    }

    /// active -> finished
    pub fn finish(&mut self, now_millis: i64) -> Result<()> {
        self.transition(&[TicketStatus::Active], TicketStatus::Finished, now_millis)
    }

    /// queued | active -> expired
    pub fn expire(&mut self, now_millis: i64) -> Result<()> {
        self.transition(
            &[TicketStatus::Queued, TicketStatus::Active],
            TicketStatus::Expired,
            now_millis,
        )
    }

    /// Force clear: any state -> deleted
    pub fn delete(&mut self, now_millis: i64) {
        self.status = TicketStatus::Deleted;
        self.updated_at = now_millis;
    }

    fn transition(
        &mut self,
        from: &[TicketStatus],
        to: TicketStatus,
        now_millis: i64,
    ) -> Result<()> {
        if !from.contains(&self.status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = now_millis;
        Ok(())
    }
}

/// A single status change to mirror into the ticket store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub uuid: TicketId,
    pub status: TicketStatus,
    pub activated_at: Option<i64>,
    pub updated_at: i64,
}
