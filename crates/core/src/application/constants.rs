// Waitlist constants (no magic values)
use std::time::Duration;

/// Wait timeout used when the caller supplies none (60s)
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on a caller-supplied wait timeout (1 hour)
pub const MAX_WAIT_TIMEOUT: Duration = Duration::from_secs(3600);

/// How long expired/finished tickets stay listable before the reaper drops them (1 hour)
pub const DEFAULT_TERMINAL_RETENTION: Duration = Duration::from_secs(3600);

/// Reaper tick (60s)
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Maximum length of resource, scope and id
pub const MAX_KEY_PART_LEN: usize = 128;

/// Maximum length of the optional action label
pub const MAX_ACTION_LEN: usize = 64;
