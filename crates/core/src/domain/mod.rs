// Domain Layer - Tickets, queue keys and the per-key queue state machine

pub mod error;
pub mod queue;
pub mod ticket;

// Re-exports
pub use error::DomainError;
pub use queue::{PendingEntry, TicketQueue};
pub use ticket::{QueueKey, ResourceId, StatusUpdate, Ticket, TicketId, TicketStatus};
