// Waitlist configuration

use crate::application::constants::{
    DEFAULT_REAP_INTERVAL, DEFAULT_TERMINAL_RETENTION, DEFAULT_WAIT_TIMEOUT, MAX_WAIT_TIMEOUT,
};
use std::time::Duration;

/// Tunables of the scheduling engine
#[derive(Debug, Clone)]
pub struct WaitlistConfig {
    /// Wait timeout when the caller gives none
    pub default_wait: Duration,

    /// Caller-supplied wait timeouts are clamped to this
    pub max_wait: Duration,

    /// Terminal tickets older than this are purged by the reaper
    pub terminal_retention: Duration,

    /// Reaper tick
    pub reap_interval: Duration,
}

impl Default for WaitlistConfig {
    fn default() -> Self {
        Self {
            default_wait: DEFAULT_WAIT_TIMEOUT,
            max_wait: MAX_WAIT_TIMEOUT,
            terminal_retention: DEFAULT_TERMINAL_RETENTION,
            reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

impl WaitlistConfig {
    /// Effective timeout for a wait request
    pub fn wait_timeout(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or(self.default_wait).min(self.max_wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_timeout_defaults_and_clamps() {
        let config = WaitlistConfig::default();
        assert_eq!(config.wait_timeout(None), DEFAULT_WAIT_TIMEOUT);
        assert_eq!(
            config.wait_timeout(Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.wait_timeout(Some(Duration::from_secs(86_400))),
            MAX_WAIT_TIMEOUT
        );
    }
}
