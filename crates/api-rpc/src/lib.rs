//! JSON-RPC API Layer
//!
//! Exposes the waitlist operations as JSON-RPC 2.0 methods (`tickets.*.v1`,
//! `admin.stats.v1`). Timestamps travel as RFC 3339 strings.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
