//! Row shapes and conversions.
//!
//! Timestamps are stored as Unix epoch milliseconds (INTEGER columns);
//! enums as their snake_case tags. A row that fails conversion is logged
//! and skipped rather than failing the whole load.

use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use sqlx::FromRow;

use crate::models::{Credential, CredentialOrigin, CredentialStatus, Provider};

#[derive(Debug, Clone, FromRow)]
pub struct CredentialRow {
    pub id: String,
    pub provider: String,
    pub secret: String,
    pub search_engine_id: Option<String>,
    pub daily_limit: i64,
    pub monthly_limit: i64,
    pub used_today: i64,
    pub used_this_month: i64,
    pub status: String,
    pub priority: i64,
    pub last_used_at: Option<i64>,
    pub error_count: i64,
    pub success_rate: f64,
    pub monthly_reset_at: i64,
    pub origin: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CredentialRow {
    /// Converts a row into the domain model; `None` (with a warning) when
    /// a tag column holds an unknown value.
    pub fn into_credential(self) -> Option<Credential> {
        let provider = match Provider::parse(&self.provider) {
            Some(p) => p,
            None => {
                warn!("Skipping credential {} with unknown provider '{}'", self.id, self.provider);
                return None;
            }
        };
        let status = match CredentialStatus::parse(&self.status) {
            Some(s) => s,
            None => {
                warn!("Skipping credential {} with unknown status '{}'", self.id, self.status);
                return None;
            }
        };
        let origin = match CredentialOrigin::parse(&self.origin) {
            Some(o) => o,
            None => {
                warn!("Skipping credential {} with unknown origin '{}'", self.id, self.origin);
                return None;
            }
        };

        Some(Credential {
            id: self.id,
            provider,
            secret: self.secret,
            search_engine_id: self.search_engine_id,
            daily_limit: clamp_u32(self.daily_limit),
            monthly_limit: clamp_u32(self.monthly_limit),
            used_today: clamp_u32(self.used_today),
            used_this_month: clamp_u32(self.used_this_month),
            status,
            priority: clamp_u32(self.priority),
            last_used_at: self.last_used_at.map(millis_to_datetime),
            error_count: clamp_u32(self.error_count),
            success_rate: self.success_rate.clamp(0.0, 100.0),
            monthly_reset_at: millis_to_datetime(self.monthly_reset_at),
            origin,
            created_at: millis_to_datetime(self.created_at),
            updated_at: millis_to_datetime(self.updated_at),
        })
    }
}

pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn datetime_to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn clamp_u32(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> CredentialRow {
        CredentialRow {
            id: "k1".into(),
            provider: "native_serp".into(),
            secret: "0123456789abcdef0123456789abcdef".into(),
            search_engine_id: None,
            daily_limit: 100,
            monthly_limit: 0,
            used_today: 5,
            used_this_month: 20,
            status: "active".into(),
            priority: 1,
            last_used_at: Some(1_700_000_000_000),
            error_count: 0,
            success_rate: 98.5,
            monthly_reset_at: 1_700_000_000_000,
            origin: "configured".into(),
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_row_round_trip() {
        let cred = row().into_credential().unwrap();
        assert_eq!(cred.provider, Provider::NativeSerp);
        assert_eq!(cred.status, CredentialStatus::Active);
        assert_eq!(cred.used_today, 5);
        assert_eq!(datetime_to_millis(cred.monthly_reset_at), 1_700_000_000_000);
    }

    #[test]
    fn test_unknown_tags_are_skipped() {
        let mut bad = row();
        bad.provider = "carrier_pigeon".into();
        assert!(bad.into_credential().is_none());

        let mut bad = row();
        bad.status = "resting".into();
        assert!(bad.into_credential().is_none());
    }

    #[test]
    fn test_negative_counters_clamp_to_zero() {
        let mut bad = row();
        bad.used_today = -5;
        let cred = bad.into_credential().unwrap();
        assert_eq!(cred.used_today, 0);
    }
}
