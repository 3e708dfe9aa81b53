//! Daemon configuration from environment variables

use std::time::Duration;
use waitlist_api_rpc::RpcServerConfig;
use waitlist_core::application::WaitlistConfig;

const DEFAULT_DB_PATH: &str = "~/.waitlist/tickets.db";

/// Everything the composition root needs
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: String,
    pub log_format: LogFormat,
    pub waitlist: WaitlistConfig,
    pub rpc: RpcServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let secs = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_secs).unwrap_or(default)
        };

        let waitlist_defaults = WaitlistConfig::default();
        let waitlist = WaitlistConfig {
            default_wait: secs("WAITLIST_DEFAULT_WAIT_SECS", waitlist_defaults.default_wait),
            max_wait: secs("WAITLIST_MAX_WAIT_SECS", waitlist_defaults.max_wait),
            terminal_retention: secs(
                "WAITLIST_RETENTION_SECS",
                waitlist_defaults.terminal_retention,
            ),
            reap_interval: secs("WAITLIST_REAP_INTERVAL_SECS", waitlist_defaults.reap_interval)
                .max(Duration::from_secs(1)),
        };

        let rpc_defaults = RpcServerConfig::default();
        let rpc = RpcServerConfig {
            host: lookup("WAITLIST_RPC_HOST").unwrap_or(rpc_defaults.host),
            port: lookup("WAITLIST_RPC_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(rpc_defaults.port),
            rate_limit_burst: lookup("WAITLIST_RATE_LIMIT_BURST")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(rpc_defaults.rate_limit_burst),
            rate_limit_rate: lookup("WAITLIST_RATE_LIMIT_RATE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(rpc_defaults.rate_limit_rate),
        };

        let db_path = lookup("WAITLIST_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let log_format = match lookup("WAITLIST_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            db_path: shellexpand::tilde(&db_path).into_owned(),
            log_format,
            waitlist,
            rpc,
        }
    }

    /// sqlx connection URL for the database path
    pub fn database_url(&self) -> String {
        if self.db_path.starts_with("sqlite:") {
            self.db_path.clone()
        } else {
            format!("sqlite://{}", self.db_path)
        }
    }
}
