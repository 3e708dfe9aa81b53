// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid ticket state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    #[error("Slot already occupied for {0}")]
    SlotOccupied(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Queue invariant violated: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
