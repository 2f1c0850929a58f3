//! Durable credential projection.
//!
//! The surface the pool manager consumes: load on boot, idempotent usage
//! upserts off the critical path, and the two counter resets. The pool owns
//! the authoritative in-memory state; rows here are eventually consistent
//! with it.

use std::sync::Arc;

use sqlx::{Pool, Sqlite};

use crate::error_handling::StorageError;
use crate::models::{Credential, UsagePatch};

use super::models::{datetime_to_millis, CredentialRow};

#[derive(Clone)]
pub struct CredentialStore {
    pool: Arc<Pool<Sqlite>>,
}

impl CredentialStore {
    pub fn new(pool: Arc<Pool<Sqlite>>) -> Self {
        CredentialStore { pool }
    }

    /// Loads every stored credential, skipping rows that no longer parse.
    pub async fn load_all(&self) -> Result<Vec<Credential>, StorageError> {
        let rows: Vec<CredentialRow> = sqlx::query_as("SELECT * FROM credentials ORDER BY priority, id")
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows.into_iter().filter_map(CredentialRow::into_credential).collect())
    }

    /// Inserts or fully replaces a credential row.
    pub async fn upsert(&self, credential: &Credential) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO credentials (
                id, provider, secret, search_engine_id, daily_limit, monthly_limit,
                used_today, used_this_month, status, priority, last_used_at,
                error_count, success_rate, monthly_reset_at, origin, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                provider = excluded.provider,
                secret = excluded.secret,
                search_engine_id = excluded.search_engine_id,
                daily_limit = excluded.daily_limit,
                monthly_limit = excluded.monthly_limit,
                used_today = excluded.used_today,
                used_this_month = excluded.used_this_month,
                status = excluded.status,
                priority = excluded.priority,
                last_used_at = excluded.last_used_at,
                error_count = excluded.error_count,
                success_rate = excluded.success_rate,
                monthly_reset_at = excluded.monthly_reset_at,
                origin = excluded.origin,
                updated_at = excluded.updated_at",
        )
        .bind(&credential.id)
        .bind(credential.provider.as_str())
        .bind(&credential.secret)
        .bind(&credential.search_engine_id)
        .bind(i64::from(credential.daily_limit))
        .bind(i64::from(credential.monthly_limit))
        .bind(i64::from(credential.used_today))
        .bind(i64::from(credential.used_this_month))
        .bind(credential.status.as_str())
        .bind(i64::from(credential.priority))
        .bind(credential.last_used_at.map(datetime_to_millis))
        .bind(i64::from(credential.error_count))
        .bind(credential.success_rate)
        .bind(datetime_to_millis(credential.monthly_reset_at))
        .bind(credential.origin.as_str())
        .bind(datetime_to_millis(credential.created_at))
        .bind(datetime_to_millis(credential.updated_at))
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    /// Writes the mutable usage columns of one credential. Idempotent; a
    /// missing row is a no-op (the boot reconciliation inserts rows).
    pub async fn upsert_usage(&self, id: &str, patch: &UsagePatch) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE credentials SET
                used_today = ?,
                used_this_month = ?,
                status = ?,
                last_used_at = ?,
                error_count = ?,
                success_rate = ?,
                monthly_reset_at = ?,
                updated_at = ?
            WHERE id = ?",
        )
        .bind(i64::from(patch.used_today))
        .bind(i64::from(patch.used_this_month))
        .bind(patch.status.as_str())
        .bind(patch.last_used_at.map(datetime_to_millis))
        .bind(i64::from(patch.error_count))
        .bind(patch.success_rate)
        .bind(datetime_to_millis(patch.monthly_reset_at))
        .bind(datetime_to_millis(patch.updated_at))
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Credential>, StorageError> {
        let row: Option<CredentialRow> = sqlx::query_as("SELECT * FROM credentials WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(row.and_then(CredentialRow::into_credential))
    }

    /// Zeroes every daily counter and reactivates all non-paused rows.
    pub async fn reset_daily_all(&self, now_millis: i64) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "UPDATE credentials SET
                used_today = 0,
                error_count = 0,
                status = CASE WHEN status = 'paused' THEN 'paused' ELSE 'active' END,
                updated_at = ?",
        )
        .bind(now_millis)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    /// Zeroes monthly counters, reopens exhausted rows whose daily counter
    /// is still under limit, and stamps the new reset time.
    pub async fn reset_monthly_all(&self, now_millis: i64) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "UPDATE credentials SET
                used_this_month = 0,
                monthly_reset_at = ?,
                status = CASE
                    WHEN status = 'exhausted' AND used_today < daily_limit THEN 'active'
                    ELSE status
                END,
                updated_at = ?",
        )
        .bind(now_millis)
        .bind(now_millis)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected())
    }
}
