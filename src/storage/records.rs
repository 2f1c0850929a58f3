//! Ranking-record persistence.
//!
//! Records are append-only. The structured sub-records serialize to JSON
//! text columns; the scalar columns back the analytics indexes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

use crate::error_handling::StorageError;
use crate::models::RankingRecord;

use super::models::datetime_to_millis;

#[derive(Clone)]
pub struct RecordStore {
    pool: Arc<Pool<Sqlite>>,
}

impl RecordStore {
    pub fn new(pool: Arc<Pool<Sqlite>>) -> Self {
        RecordStore { pool }
    }

    /// Appends one record, returning its row id.
    pub async fn insert(&self, record: &RankingRecord) -> Result<i64, StorageError> {
        let validation = serde_json::to_string(&record.validation).unwrap_or_else(|_| "{}".into());
        let metadata = serde_json::to_string(&record.metadata).unwrap_or_else(|_| "{}".into());
        let competitors =
            serde_json::to_string(&record.competitors).unwrap_or_else(|_| "[]".into());
        let location = serde_json::to_string(&record.location).unwrap_or_else(|_| "{}".into());
        let raw_response = record
            .raw_response
            .as_ref()
            .map(|raw| serde_json::to_string(raw).unwrap_or_else(|_| "{}".into()));
        let reliability =
            serde_json::to_string(&record.reliability).unwrap_or_else(|_| "\"low\"".into());

        let row = sqlx::query(
            "INSERT INTO ranking_records (
                keyword, target_domain, position, found, url, title, snippet,
                country, total_results, organic_count, reliability,
                validation, metadata, competitors, location, raw_response, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id",
        )
        .bind(&record.keyword)
        .bind(&record.target_domain)
        .bind(record.position.map(i64::from))
        .bind(record.found)
        .bind(&record.url)
        .bind(&record.title)
        .bind(&record.snippet)
        .bind(&record.location.country)
        .bind(record.total_results as i64)
        .bind(i64::from(record.organic_count))
        .bind(reliability.trim_matches('"'))
        .bind(validation)
        .bind(metadata)
        .bind(competitors)
        .bind(location)
        .bind(raw_response)
        .bind(datetime_to_millis(record.checked_at))
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.get::<i64, _>(0))
    }

    /// Deletes records checked before the cutoff; returns how many went.
    pub async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM ranking_records WHERE timestamp < ?")
            .bind(datetime_to_millis(cutoff))
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ranking_records")
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count)
    }

    /// Most recent position for a keyword/domain pair, for quick checks.
    pub async fn latest_position(
        &self,
        keyword: &str,
        domain: &str,
    ) -> Result<Option<Option<i64>>, StorageError> {
        let row = sqlx::query(
            "SELECT position FROM ranking_records
             WHERE keyword = ? AND target_domain = ?
             ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(keyword)
        .bind(domain)
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(row.map(|r| r.get::<Option<i64>, _>(0)))
    }
}
