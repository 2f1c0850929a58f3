//! Credential state and pool-level aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// EWMA smoothing factor for the per-credential success rate.
const SUCCESS_RATE_ALPHA: f64 = 0.05;

/// Upstream search provider a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    NativeSerp,
    CustomSearch,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::NativeSerp => "native_serp",
            Provider::CustomSearch => "custom_search",
        }
    }

    pub fn parse(s: &str) -> Option<Provider> {
        match s {
            "native_serp" => Some(Provider::NativeSerp),
            "custom_search" => Some(Provider::CustomSearch),
            _ => None,
        }
    }
}

/// Lifecycle status of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Exhausted,
    Paused,
    Error,
}

impl CredentialStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Exhausted => "exhausted",
            CredentialStatus::Paused => "paused",
            CredentialStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<CredentialStatus> {
        match s {
            "active" => Some(CredentialStatus::Active),
            "exhausted" => Some(CredentialStatus::Exhausted),
            "paused" => Some(CredentialStatus::Paused),
            "error" => Some(CredentialStatus::Error),
            _ => None,
        }
    }
}

/// Where a credential came from. Configured credentials are reconstructed
/// from the environment each boot; user-added ones live only in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialOrigin {
    Configured,
    UserAdded,
}

impl CredentialOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialOrigin::Configured => "configured",
            CredentialOrigin::UserAdded => "user_added",
        }
    }

    pub fn parse(s: &str) -> Option<CredentialOrigin> {
        match s {
            "configured" => Some(CredentialOrigin::Configured),
            "user_added" => Some(CredentialOrigin::UserAdded),
            _ => None,
        }
    }
}

/// Per-credential health band derived from daily usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialHealth {
    Healthy,
    Warning,
    Critical,
    Exhausted,
}

/// A single API credential with its quota counters and health state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub provider: Provider,
    pub secret: String,
    /// Required when `provider` is `custom_search`.
    pub search_engine_id: Option<String>,
    pub daily_limit: u32,
    /// 0 means no monthly cap.
    pub monthly_limit: u32,
    pub used_today: u32,
    pub used_this_month: u32,
    pub status: CredentialStatus,
    /// 1 is the highest priority; lower values are preferred.
    pub priority: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub error_count: u32,
    /// EWMA of the successful-call ratio, 0..100.
    pub success_rate: f64,
    pub monthly_reset_at: DateTime<Utc>,
    pub origin: CredentialOrigin,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Whether this credential can serve a request for `provider` right now.
    ///
    /// Availability does not consider the in-flight lock set; the pool checks
    /// that separately under its mutex.
    pub fn is_available_for(&self, provider: Provider) -> bool {
        self.provider == provider
            && self.status == CredentialStatus::Active
            && self.has_daily_capacity()
            && self.has_monthly_capacity()
    }

    pub fn has_daily_capacity(&self) -> bool {
        self.used_today < self.daily_limit
    }

    pub fn has_monthly_capacity(&self) -> bool {
        self.monthly_limit == 0 || self.used_this_month < self.monthly_limit
    }

    /// Records a successful call: bumps both counters, folds a success into
    /// the EWMA, and flips to exhausted when a limit is hit so the next
    /// selection observes the transition.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.used_today += 1;
        self.used_this_month += 1;
        self.success_rate = ewma(self.success_rate, 100.0);
        self.last_used_at = Some(now);
        self.updated_at = now;
        if !self.has_daily_capacity() || !self.has_monthly_capacity() {
            self.status = CredentialStatus::Exhausted;
        }
    }

    /// Records a failed call: bumps the error counter and folds a failure
    /// into the EWMA. Status transitions are decided by the pool based on
    /// the error kind.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.error_count += 1;
        self.success_rate = ewma(self.success_rate, 0.0);
        self.updated_at = now;
    }

    /// Fraction of the daily limit consumed, 0.0..=1.0.
    pub fn daily_usage_fraction(&self) -> f64 {
        if self.daily_limit == 0 {
            return 0.0;
        }
        f64::from(self.used_today) / f64::from(self.daily_limit)
    }

    pub fn health(&self) -> CredentialHealth {
        if self.status == CredentialStatus::Exhausted || !self.has_daily_capacity() {
            return CredentialHealth::Exhausted;
        }
        let pct = self.daily_usage_fraction() * 100.0;
        if pct >= 90.0 {
            CredentialHealth::Critical
        } else if pct >= 75.0 {
            CredentialHealth::Warning
        } else {
            CredentialHealth::Healthy
        }
    }

    /// Snapshot of the durable usage columns for an asynchronous upsert.
    pub fn usage_patch(&self) -> UsagePatch {
        UsagePatch {
            used_today: self.used_today,
            used_this_month: self.used_this_month,
            status: self.status,
            last_used_at: self.last_used_at,
            error_count: self.error_count,
            success_rate: self.success_rate,
            monthly_reset_at: self.monthly_reset_at,
            updated_at: self.updated_at,
        }
    }
}

fn ewma(current: f64, outcome: f64) -> f64 {
    (1.0 - SUCCESS_RATE_ALPHA) * current + SUCCESS_RATE_ALPHA * outcome
}

/// The mutable usage columns of a credential, written by the store's
/// idempotent `upsert_usage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsagePatch {
    pub used_today: u32,
    pub used_this_month: u32,
    pub status: CredentialStatus,
    pub last_used_at: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub success_rate: f64,
    pub monthly_reset_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-credential view inside a pool snapshot. The secret never leaves the
/// pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSnapshot {
    pub id: String,
    pub provider: Provider,
    pub status: CredentialStatus,
    pub priority: u32,
    pub used_today: u32,
    pub daily_limit: u32,
    pub used_this_month: u32,
    pub monthly_limit: u32,
    pub success_rate: f64,
    pub health: CredentialHealth,
}

/// Aggregate pool statistics, computed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub active: usize,
    pub exhausted: usize,
    pub paused: usize,
    pub error: usize,
    pub daily_used: u64,
    pub daily_capacity: u64,
    pub monthly_used: u64,
    pub monthly_capacity: u64,
    /// Daily usage as a percentage of daily capacity.
    pub usage_percent: f64,
    /// Hours until the daily capacity runs out at today's observed rate.
    /// `None` when nothing has been used yet.
    pub estimated_hours_to_exhaustion: Option<f64>,
    pub credentials: Vec<CredentialSnapshot>,
}

impl PoolStats {
    pub fn empty() -> Self {
        PoolStats {
            total: 0,
            active: 0,
            exhausted: 0,
            paused: 0,
            error: 0,
            daily_used: 0,
            daily_capacity: 0,
            monthly_used: 0,
            monthly_capacity: 0,
            usage_percent: 0.0,
            estimated_hours_to_exhaustion: None,
            credentials: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(daily: u32, monthly: u32) -> Credential {
        let now = Utc::now();
        Credential {
            id: "k1".into(),
            provider: Provider::NativeSerp,
            secret: "0123456789abcdef0123456789abcdef".into(),
            search_engine_id: None,
            daily_limit: daily,
            monthly_limit: monthly,
            used_today: 0,
            used_this_month: 0,
            status: CredentialStatus::Active,
            priority: 1,
            last_used_at: None,
            error_count: 0,
            success_rate: 100.0,
            monthly_reset_at: now,
            origin: CredentialOrigin::Configured,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_success_transitions_to_exhausted_at_daily_limit() {
        let mut cred = credential(2, 0);
        cred.record_success(Utc::now());
        assert_eq!(cred.status, CredentialStatus::Active);
        cred.record_success(Utc::now());
        assert_eq!(cred.status, CredentialStatus::Exhausted);
        assert_eq!(cred.used_today, 2);
        assert!(!cred.is_available_for(Provider::NativeSerp));
    }

    #[test]
    fn test_monthly_limit_zero_means_uncapped() {
        let mut cred = credential(1000, 0);
        cred.used_this_month = 1_000_000;
        assert!(cred.has_monthly_capacity());

        cred.monthly_limit = 100;
        assert!(!cred.has_monthly_capacity());
    }

    #[test]
    fn test_availability_requires_matching_provider() {
        let cred = credential(10, 0);
        assert!(cred.is_available_for(Provider::NativeSerp));
        assert!(!cred.is_available_for(Provider::CustomSearch));
    }

    #[test]
    fn test_ewma_moves_slowly() {
        let mut cred = credential(100, 0);
        cred.record_failure(Utc::now());
        assert!((cred.success_rate - 95.0).abs() < 1e-9);
        cred.record_success(Utc::now());
        assert!((cred.success_rate - 95.25).abs() < 1e-9);
    }

    #[test]
    fn test_health_bands() {
        let mut cred = credential(100, 0);
        assert_eq!(cred.health(), CredentialHealth::Healthy);
        cred.used_today = 75;
        assert_eq!(cred.health(), CredentialHealth::Warning);
        cred.used_today = 90;
        assert_eq!(cred.health(), CredentialHealth::Critical);
        cred.used_today = 100;
        assert_eq!(cred.health(), CredentialHealth::Exhausted);
    }
}
