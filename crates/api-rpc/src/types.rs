//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use waitlist_core::application::{CreateTicketRequest, WaitlistStats};
use waitlist_core::domain::Ticket;
use waitlist_core::error::AppError;

/// Ticket deadline as sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Deadline {
    /// Epoch milliseconds
    EpochMillis(i64),
    /// RFC 3339 / ISO-8601 timestamp, e.g. `2024-05-01T12:00:00Z`
    Timestamp(String),
}

impl Deadline {
    pub fn to_millis(&self) -> Result<i64, AppError> {
        match self {
            Deadline::EpochMillis(ms) => Ok(*ms),
            Deadline::Timestamp(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| AppError::InvalidDeadline(format!("'{}': {}", s, e))),
        }
    }
}

/// tickets.create.v1 - Create a ticket
#[derive(Debug, Deserialize)]
pub struct CreateTicketParams {
    pub resource: String,
    pub scope: String,
    pub id: String,
    pub expires_at: Deadline,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl CreateTicketParams {
    pub fn into_request(self) -> Result<CreateTicketRequest, AppError> {
        let mut req = CreateTicketRequest::new(
            self.resource,
            self.scope,
            self.id,
            self.expires_at.to_millis()?,
        );
        req.action = self.action;
        req.extra = self.extra;
        Ok(req)
    }
}

/// Ticket as returned by every tickets.* method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub uuid: String,
    pub resource: String,
    pub scope: String,
    pub id: String,
    pub status: String,
    pub created_at: String,
    pub expires_at: String,
    pub updated_at: String,
    pub activated_at: Option<String>,
    pub action: Option<String>,
    pub extra: serde_json::Value,
}

impl From<Ticket> for TicketRecord {
    fn from(ticket: Ticket) -> Self {
        Self {
            status: ticket.status.to_string(),
            created_at: iso8601(ticket.created_at),
            expires_at: iso8601(ticket.expires_at),
            updated_at: iso8601(ticket.updated_at),
            activated_at: ticket.activated_at.map(iso8601),
            uuid: ticket.uuid,
            resource: ticket.resource,
            scope: ticket.scope,
            id: ticket.id,
            action: ticket.action,
            extra: ticket.extra,
        }
    }
}

/// Epoch ms -> RFC 3339 with millisecond precision
pub fn iso8601(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}

/// tickets.list.v1 - Tickets of a resource
#[derive(Debug, Deserialize)]
pub struct ListTicketsRequest {
    pub resource: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListTicketsResponse {
    pub resource: String,
    pub tickets: Vec<TicketRecord>,
}

/// tickets.get.v1 / tickets.release.v1
#[derive(Debug, Deserialize)]
pub struct TicketRef {
    pub uuid: String,
}

/// tickets.wait.v1 - Block until the ticket is active
#[derive(Debug, Deserialize)]
pub struct WaitTicketRequest {
    pub uuid: String,
    /// Falls back to the server default; clamped to the server maximum
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// tickets.delete_all.v1 - Delete every ticket of a resource
#[derive(Debug, Deserialize)]
pub struct DeleteAllRequest {
    pub resource: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteAllResponse {
    pub resource: String,
    pub deleted: usize,
    pub forced: bool,
}

/// admin.stats.v1 - Engine statistics
#[derive(Debug, Default, Deserialize)]
pub struct StatsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub waitlist: WaitlistStats,
    pub rate_limit_tokens: u32,
    pub uptime_seconds: u64,
}
