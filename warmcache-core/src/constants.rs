//! Default values shared by both cache engines.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// REFRESH DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Retry interval applied when the configured one is zero or negative.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Multiplier applied to `expiration` when no usable evict timeout is configured.
pub const DEFAULT_EVICT_MULTIPLIER: u32 = 2;

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENT KEYS
// ═══════════════════════════════════════════════════════════════════════════════
// Suffixes appended to the caller's prefix by `CacheOptions::from_env`.

/// Refresh interval after a successful load.
pub const ENV_EXPIRATION_MS: &str = "EXPIRATION_MS";

/// Refresh interval after a failed load.
pub const ENV_EXPIRATION_ON_ERR_MS: &str = "EXPIRATION_ON_ERR_MS";

/// Minimum spacing between refresh attempts.
pub const ENV_RETRY_INTERVAL_MS: &str = "RETRY_INTERVAL_MS";

/// Longest a reader waits for the very first value.
pub const ENV_WAIT_TIMEOUT_MS: &str = "WAIT_TIMEOUT_MS";

/// Idle time before a keyed entry is evicted.
pub const ENV_EVICT_TIMEOUT_MS: &str = "EVICT_TIMEOUT_MS";
