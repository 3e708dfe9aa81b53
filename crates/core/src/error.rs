// Central Error Type for the Application

use crate::domain::TicketStatus;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid deadline: {0}")]
    InvalidDeadline(String),

    #[error("Ticket {uuid} is not active (status: {status})")]
    NotActive { uuid: String, status: TicketStatus },

    #[error("Queue busy: {0}")]
    QueueBusy(String),

    #[error("ticket has expired")]
    TicketExpired { uuid: String, status: TicketStatus },

    #[error("Wait timed out after {0}ms")]
    WaitTimeout(u64),

    #[error("Ticket store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in the infra-sqlite crate
// by converting to AppError::StoreUnavailable(String)
