// Waitlist Infrastructure - SQLite Adapter
// Implements: TicketStore

mod connection;
mod migration;
mod ticket_store;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use ticket_store::SqliteTicketStore;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
