//! Configuration constants.
//!
//! Defaults for every tunable; the environment overrides each one (see
//! `TrackerConfig::from_env`).

use std::time::Duration;

/// Default per-request abort deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a rate-limited credential stays paused before its prior status
/// is restored.
pub const DEFAULT_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(60);

/// Upper bound on pool-rotation retries per lookup; the effective value is
/// `min(pool_size, this)`.
pub const DEFAULT_POOL_MAX_RETRIES: usize = 3;

// Bulk execution defaults
pub const DEFAULT_BULK_BATCH_SIZE: usize = 5;
pub const DEFAULT_BULK_INTER_BATCH_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_BULK_MAX_CONCURRENT: usize = 2;
pub const DEFAULT_BULK_RETRY_ENABLED: bool = true;
pub const DEFAULT_BULK_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BULK_ADAPTIVE_DELAY: bool = true;
/// Wall-clock budget for one bulk run.
pub const DEFAULT_BULK_TIME_BUDGET: Duration = Duration::from_millis(290_000);
/// Adaptive inter-batch delay never grows beyond this.
pub const ADAPTIVE_DELAY_CEILING: Duration = Duration::from_millis(10_000);
/// Retry-pass back-off (`baseline * attempt`) caps here.
pub const RETRY_BACKOFF_CEILING: Duration = Duration::from_millis(5_000);

/// Ranking records older than this many days are swept weekly.
pub const DEFAULT_RETENTION_DAYS: u32 = 90;

/// Native-SERP secrets shorter than this are rejected outright.
pub const MIN_NATIVE_SECRET_LEN: usize = 32;

/// Default daily quota for a configured credential without an explicit one.
pub const DEFAULT_DAILY_LIMIT: u32 = 100;

/// Highest credential index probed in the environment. Gaps in the
/// numbering are tolerated.
pub const MAX_CONFIGURED_CREDENTIALS: usize = 32;

/// Substrings marking a secret as a placeholder someone forgot to replace.
pub const PLACEHOLDER_SECRET_MARKERS: &[&str] = &["CHANGE_ME", "replace_with", "changeme"];

/// Provider endpoints; overridable for tests and proxies.
pub const DEFAULT_NATIVE_SERP_ENDPOINT: &str = "https://serpapi.com/search";
pub const DEFAULT_CUSTOM_SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Default SQLite database path.
pub const DB_PATH: &str = "./rank_tracker.db";
