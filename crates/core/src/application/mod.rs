// Application Layer - Use Cases and Scheduling Engine

pub mod broker;
pub mod config;
pub mod constants;
pub mod expiry;
pub mod maintenance;
pub mod outbox;
pub mod shutdown;
pub mod waitlist;

// Re-exports
pub use broker::{WaitBroker, WaitOutcome};
pub use config::WaitlistConfig;
pub use expiry::{ExpiryEngine, ExpiryHandler};
pub use maintenance::{ReapStats, TicketReaper};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use waitlist::{CreateTicketRequest, RestoreReport, WaitlistService, WaitlistStats};
