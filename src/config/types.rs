//! Configuration types.
//!
//! `TrackerConfig` is the library-level configuration, constructed from the
//! environment (`from_env`) or programmatically. The CLI layers `clap`
//! flags on top of it.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use log::warn;

use crate::models::Provider;

use super::constants::*;

/// Logging level for the application.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// How the pool picks the next credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RotationStrategy {
    /// Lowest priority value wins (default).
    Priority,
    /// Fewest calls today wins.
    LeastUsed,
    /// Cycle through available credentials.
    RoundRobin,
}

impl RotationStrategy {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "priority" => Some(RotationStrategy::Priority),
            "least_used" => Some(RotationStrategy::LeastUsed),
            "round_robin" => Some(RotationStrategy::RoundRobin),
            _ => None,
        }
    }
}

/// A credential entry read from the environment, not yet validated. The
/// pool validates and numbers these on boot.
#[derive(Debug, Clone)]
pub struct ConfiguredCredential {
    /// Position in the environment numbering, 1-based.
    pub index: usize,
    pub provider: Provider,
    pub secret: String,
    pub search_engine_id: Option<String>,
    pub daily_limit: u32,
    pub monthly_limit: u32,
    pub priority: Option<u32>,
}

/// Bulk-executor tunables.
#[derive(Debug, Clone)]
pub struct BulkSettings {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub max_concurrent: usize,
    pub retry_enabled: bool,
    pub max_retries: u32,
    pub adaptive_delay: bool,
    pub time_budget: Duration,
}

impl Default for BulkSettings {
    fn default() -> Self {
        BulkSettings {
            batch_size: DEFAULT_BULK_BATCH_SIZE,
            inter_batch_delay: DEFAULT_BULK_INTER_BATCH_DELAY,
            max_concurrent: DEFAULT_BULK_MAX_CONCURRENT,
            retry_enabled: DEFAULT_BULK_RETRY_ENABLED,
            max_retries: DEFAULT_BULK_MAX_RETRIES,
            adaptive_delay: DEFAULT_BULK_ADAPTIVE_DELAY,
            time_budget: DEFAULT_BULK_TIME_BUDGET,
        }
    }
}

/// Library configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// SQLite database path.
    pub db_path: PathBuf,
    pub rotation: RotationStrategy,
    /// Per-request abort deadline.
    pub request_timeout: Duration,
    /// Pause applied to rate-limited credentials.
    pub rate_limit_pause: Duration,
    /// Cap on rotation retries per lookup.
    pub pool_max_retries: usize,
    pub native_serp_endpoint: String,
    pub custom_search_endpoint: String,
    pub bulk: BulkSettings,
    /// Ranking-record retention for the weekly sweep, days.
    pub retention_days: u32,
    /// Credentials declared in the environment.
    pub configured_credentials: Vec<ConfiguredCredential>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            db_path: PathBuf::from(DB_PATH),
            rotation: RotationStrategy::Priority,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rate_limit_pause: DEFAULT_RATE_LIMIT_PAUSE,
            pool_max_retries: DEFAULT_POOL_MAX_RETRIES,
            native_serp_endpoint: DEFAULT_NATIVE_SERP_ENDPOINT.to_string(),
            custom_search_endpoint: DEFAULT_CUSTOM_SEARCH_ENDPOINT.to_string(),
            bulk: BulkSettings::default(),
            retention_days: DEFAULT_RETENTION_DAYS,
            configured_credentials: Vec::new(),
        }
    }
}

impl TrackerConfig {
    /// Builds the configuration from environment variables, falling back to
    /// defaults for anything unset. Unparseable values are logged and
    /// ignored rather than failing boot.
    pub fn from_env() -> Self {
        let mut config = TrackerConfig {
            db_path: std::env::var("RANK_TRACKER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DB_PATH)),
            ..Default::default()
        };

        if let Some(strategy) = env_string("ROTATION_STRATEGY") {
            match RotationStrategy::parse(&strategy) {
                Some(parsed) => config.rotation = parsed,
                None => warn!("Unknown ROTATION_STRATEGY '{strategy}', keeping priority"),
            }
        }
        if let Some(ms) = env_parse::<u64>("REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("RATE_LIMIT_PAUSE_MS") {
            config.rate_limit_pause = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<usize>("POOL_MAX_RETRIES") {
            config.pool_max_retries = n;
        }
        if let Some(endpoint) = env_string("SERP_API_ENDPOINT") {
            config.native_serp_endpoint = endpoint;
        }
        if let Some(endpoint) = env_string("CUSTOM_SEARCH_ENDPOINT") {
            config.custom_search_endpoint = endpoint;
        }
        if let Some(days) = env_parse::<u32>("RECORD_RETENTION_DAYS") {
            config.retention_days = days;
        }

        if let Some(n) = env_parse::<usize>("BULK_BATCH_SIZE") {
            config.bulk.batch_size = n.max(1);
        }
        if let Some(ms) = env_parse::<u64>("BULK_INTER_BATCH_DELAY_MS") {
            config.bulk.inter_batch_delay = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<usize>("BULK_MAX_CONCURRENT") {
            config.bulk.max_concurrent = n.max(1);
        }
        if let Some(enabled) = env_parse::<bool>("BULK_RETRY_ENABLED") {
            config.bulk.retry_enabled = enabled;
        }
        if let Some(n) = env_parse::<u32>("BULK_MAX_RETRIES") {
            config.bulk.max_retries = n;
        }
        if let Some(enabled) = env_parse::<bool>("BULK_ADAPTIVE_DELAY") {
            config.bulk.adaptive_delay = enabled;
        }
        if let Some(ms) = env_parse::<u64>("BULK_TIME_BUDGET_MS") {
            config.bulk.time_budget = Duration::from_millis(ms);
        }

        config.configured_credentials = read_configured_credentials();
        config
    }
}

/// Scans `SERP_API_KEY_{n}` and `CUSTOM_SEARCH_KEY_{n}` entries, tolerating
/// gaps in the numbering. Validation happens in the pool on boot.
fn read_configured_credentials() -> Vec<ConfiguredCredential> {
    let mut entries = Vec::new();

    for index in 1..=MAX_CONFIGURED_CREDENTIALS {
        if let Some(secret) = env_string(&format!("SERP_API_KEY_{index}")) {
            entries.push(ConfiguredCredential {
                index,
                provider: Provider::NativeSerp,
                secret,
                search_engine_id: None,
                daily_limit: env_parse::<u32>(&format!("SERP_API_KEY_{index}_DAILY_LIMIT"))
                    .unwrap_or(DEFAULT_DAILY_LIMIT),
                monthly_limit: env_parse::<u32>(&format!("SERP_API_KEY_{index}_MONTHLY_LIMIT"))
                    .unwrap_or(0),
                priority: env_parse::<u32>(&format!("SERP_API_KEY_{index}_PRIORITY")),
            });
        }
    }

    for index in 1..=MAX_CONFIGURED_CREDENTIALS {
        if let Some(secret) = env_string(&format!("CUSTOM_SEARCH_KEY_{index}")) {
            entries.push(ConfiguredCredential {
                index,
                provider: Provider::CustomSearch,
                secret,
                search_engine_id: env_string(&format!("CUSTOM_SEARCH_ENGINE_ID_{index}")),
                daily_limit: env_parse::<u32>(&format!("CUSTOM_SEARCH_KEY_{index}_DAILY_LIMIT"))
                    .unwrap_or(DEFAULT_DAILY_LIMIT),
                monthly_limit: env_parse::<u32>(&format!(
                    "CUSTOM_SEARCH_KEY_{index}_MONTHLY_LIMIT"
                ))
                .unwrap_or(0),
                priority: env_parse::<u32>(&format!("CUSTOM_SEARCH_KEY_{index}_PRIORITY")),
            });
        }
    }

    entries
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable value for {name}: '{raw}'");
            None
        }
    }
}
