//! On-demand pool statistics.

use chrono::{Local, Timelike};

use crate::models::{CredentialSnapshot, CredentialStatus, PoolStats};

use super::SearchApiPool;

impl SearchApiPool {
    /// Computes pool statistics from the current in-memory state.
    pub async fn stats(&self) -> PoolStats {
        let hours = hours_since_midnight();
        self.with_credentials(|credentials| {
            let mut stats = PoolStats::empty();
            stats.total = credentials.len();

            for cred in credentials.iter() {
                match cred.status {
                    CredentialStatus::Active => stats.active += 1,
                    CredentialStatus::Exhausted => stats.exhausted += 1,
                    CredentialStatus::Paused => stats.paused += 1,
                    CredentialStatus::Error => stats.error += 1,
                }
                stats.daily_used += u64::from(cred.used_today);
                stats.daily_capacity += u64::from(cred.daily_limit);
                stats.monthly_used += u64::from(cred.used_this_month);
                stats.monthly_capacity += u64::from(cred.monthly_limit);

                stats.credentials.push(CredentialSnapshot {
                    id: cred.id.clone(),
                    provider: cred.provider,
                    status: cred.status,
                    priority: cred.priority,
                    used_today: cred.used_today,
                    daily_limit: cred.daily_limit,
                    used_this_month: cred.used_this_month,
                    monthly_limit: cred.monthly_limit,
                    success_rate: cred.success_rate,
                    health: cred.health(),
                });
            }

            if stats.daily_capacity > 0 {
                stats.usage_percent =
                    stats.daily_used as f64 / stats.daily_capacity as f64 * 100.0;
            }
            stats.estimated_hours_to_exhaustion =
                estimate_hours_to_exhaustion(stats.daily_used, stats.daily_capacity, hours);
            stats
        })
        .await
    }
}

/// `remaining / (used / hours_since_midnight)`; `None` before the first
/// call of the day.
fn estimate_hours_to_exhaustion(used: u64, capacity: u64, hours_since_midnight: f64) -> Option<f64> {
    if used == 0 || capacity <= used || hours_since_midnight <= 0.0 {
        return None;
    }
    let rate = used as f64 / hours_since_midnight;
    Some((capacity - used) as f64 / rate)
}

fn hours_since_midnight() -> f64 {
    let now = Local::now();
    f64::from(now.num_seconds_from_midnight()) / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_none_before_first_use() {
        assert_eq!(estimate_hours_to_exhaustion(0, 100, 6.0), None);
    }

    #[test]
    fn test_estimate_none_when_exhausted() {
        assert_eq!(estimate_hours_to_exhaustion(100, 100, 6.0), None);
        assert_eq!(estimate_hours_to_exhaustion(120, 100, 6.0), None);
    }

    #[test]
    fn test_estimate_scales_with_rate() {
        // 30 used over 6 hours = 5/hour; 70 remaining -> 14 hours.
        let estimate = estimate_hours_to_exhaustion(30, 100, 6.0).unwrap();
        assert!((estimate - 14.0).abs() < 1e-9);
    }
}
