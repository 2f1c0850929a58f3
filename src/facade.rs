//! Request facade.
//!
//! Thin entry point mapping an inbound request to a single- or bulk-lookup
//! and shaping the reply: normalizes the geographic context, collapses
//! one-element keyword lists to the single path, and attaches pool
//! statistics plus a human-readable insight line to every reply.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::bulk::{BulkExecutor, BulkProgress};
use crate::config::BulkSettings;
use crate::error_handling::TrackError;
use crate::models::{BulkResult, Device, PoolStats, Provider, RankingRecord, SearchOptions};
use crate::pool::SearchApiPool;

/// Position bands for the insight line.
const FIRST_PAGE: u32 = 10;
const SECOND_PAGE: u32 = 20;
const TOP_FIFTY: u32 = 50;
/// Visibility-rate bands for bulk insights, percent.
const STRONG_VISIBILITY: f64 = 70.0;
const MODERATE_VISIBILITY: f64 = 40.0;

/// An inbound tracking request, optionals and all. Empty optionals never
/// fail a request; they fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackRequest {
    pub keywords: Vec<String>,
    pub domain: String,
    pub country: Option<String>,
    pub language: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub device: Option<Device>,
    pub max_results: Option<u32>,
    #[serde(default)]
    pub verify_position: bool,
    pub api_key: Option<String>,
    pub provider: Option<Provider>,
    #[serde(default)]
    pub extra_params: HashMap<String, String>,
    #[serde(default)]
    pub include_raw_response: bool,
}

/// Result payload: one record or a bulk outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackOutcome {
    Single(Box<RankingRecord>),
    Bulk(Box<BulkResult>),
}

/// Reply wrapper with pool statistics and the insight line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackResponse {
    pub outcome: TrackOutcome,
    pub pool: PoolStats,
    pub insight: String,
}

/// The facade over the pool and the bulk executor.
pub struct RankTracker {
    pool: Arc<SearchApiPool>,
    bulk: BulkExecutor,
}

impl RankTracker {
    pub fn new(pool: Arc<SearchApiPool>, bulk_settings: BulkSettings) -> Self {
        let bulk = BulkExecutor::new(Arc::clone(&pool), bulk_settings);
        RankTracker { pool, bulk }
    }

    pub fn pool(&self) -> &Arc<SearchApiPool> {
        &self.pool
    }

    /// Handles a request end to end.
    pub async fn handle(&self, request: TrackRequest) -> Result<TrackResponse, TrackError> {
        self.handle_with_progress(request, None).await
    }

    /// Same, with bulk progress events forwarded to `progress`.
    pub async fn handle_with_progress(
        &self,
        request: TrackRequest,
        progress: Option<mpsc::Sender<BulkProgress>>,
    ) -> Result<TrackResponse, TrackError> {
        let (keywords, options) = normalize_request(request);

        if keywords.len() == 1 {
            let record = self.pool.track(&keywords[0], &options).await?;
            let insight = single_insight(&record);
            return Ok(TrackResponse {
                outcome: TrackOutcome::Single(Box::new(record)),
                pool: self.pool.stats().await,
                insight,
            });
        }

        let result = self.bulk.run(keywords, &options, progress).await;
        let insight = bulk_insight(&result);
        Ok(TrackResponse {
            pool: self.pool.stats().await,
            outcome: TrackOutcome::Bulk(Box::new(result)),
            insight,
        })
    }
}

/// Trims keywords and folds the optional context into concrete options.
fn normalize_request(request: TrackRequest) -> (Vec<String>, SearchOptions) {
    let keywords: Vec<String> = request
        .keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    let country = request
        .country
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "US".to_string());
    let language = request
        .language
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "en".to_string());

    let options = SearchOptions {
        domain: request.domain.trim().to_string(),
        country,
        language,
        city: request.city.filter(|c| !c.trim().is_empty()),
        state: request.state.filter(|s| !s.trim().is_empty()),
        postal_code: request.postal_code.filter(|p| !p.trim().is_empty()),
        device: request.device.unwrap_or_default(),
        max_results: request.max_results.unwrap_or(100),
        verify_position: request.verify_position,
        api_key: request.api_key.filter(|k| !k.trim().is_empty()),
        provider: request.provider,
        extra_params: request.extra_params,
        include_raw_response: request.include_raw_response,
    };

    (keywords, options)
}

fn single_insight(record: &RankingRecord) -> String {
    match record.position {
        Some(position) if position <= FIRST_PAGE => format!(
            "'{}' ranks on the first page for {} (position {position})",
            record.keyword, record.target_domain
        ),
        Some(position) if position <= SECOND_PAGE => format!(
            "'{}' ranks on page two for {} (position {position})",
            record.keyword, record.target_domain
        ),
        Some(position) if position <= TOP_FIFTY => format!(
            "'{}' ranks in the top 50 for {} (position {position})",
            record.keyword, record.target_domain
        ),
        Some(position) => format!(
            "'{}' ranks beyond the top 50 for {} (position {position})",
            record.keyword, record.target_domain
        ),
        None => format!(
            "{} was not found in the scanned results for '{}'",
            record.target_domain, record.keyword
        ),
    }
}

fn bulk_insight(result: &BulkResult) -> String {
    if result.total_processed == 0 {
        return "no keywords to process".to_string();
    }
    let found = result.records.iter().filter(|r| r.found).count();
    let visibility = found as f64 / result.total_processed as f64 * 100.0;
    let band = if visibility >= STRONG_VISIBILITY {
        "strong"
    } else if visibility >= MODERATE_VISIBILITY {
        "moderate"
    } else {
        "weak"
    };

    let positions: Vec<u32> = result
        .records
        .iter()
        .filter_map(|r| r.position)
        .collect();
    if positions.is_empty() {
        format!(
            "{band} visibility: {found}/{} keyword(s) found ({visibility:.0}%)",
            result.total_processed
        )
    } else {
        let average = positions.iter().map(|p| f64::from(*p)).sum::<f64>()
            / positions.len() as f64;
        format!(
            "{band} visibility: {found}/{} keyword(s) found ({visibility:.0}%), average position {average:.1}",
            result.total_processed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        PositionSource, PositionValidation, QualityHistogram, Reliability, SearchLocation,
        SearchMetadata,
    };
    use chrono::Utc;

    fn record(keyword: &str, position: Option<u32>) -> RankingRecord {
        let confidence = if position.is_some() { 95 } else { 0 };
        RankingRecord {
            keyword: keyword.to_string(),
            target_domain: "example.com".to_string(),
            position,
            url: None,
            title: None,
            snippet: None,
            location: SearchLocation {
                country: "US".into(),
                language: "en".into(),
                city: None,
                state: None,
                postal_code: None,
                device: Device::Desktop,
            },
            total_results: 1000,
            organic_count: 10,
            checked_at: Utc::now(),
            found: position.is_some(),
            validation: PositionValidation {
                original_position: position,
                verified_position: None,
                position_source: PositionSource::ProviderField,
                confidence,
                serp_features: Vec::new(),
                organic_count: 10,
                total_items: 10,
                validation_method: "provider_field".into(),
                warnings: Vec::new(),
                array_index_position: position,
            },
            metadata: SearchMetadata {
                provider: Provider::NativeSerp,
                credential_id: None,
                provider_request_id: None,
                upstream_time_s: None,
                processing_time_ms: None,
            },
            raw_response: None,
            competitors: Vec::new(),
            reliability: Reliability::from_confidence(confidence),
        }
    }

    fn bulk_result(records: Vec<RankingRecord>, total: usize) -> BulkResult {
        BulkResult {
            total_processed: total,
            records,
            failures: Vec::new(),
            elapsed_ms: 100,
            pool: PoolStats::empty(),
            quality: QualityHistogram::default(),
        }
    }

    #[test]
    fn test_normalize_request_defaults() {
        let (keywords, options) = normalize_request(TrackRequest {
            keywords: vec!["  rust  ".into(), "".into(), "   ".into()],
            domain: " example.com ".into(),
            country: Some(" us ".into()),
            language: Some(" EN ".into()),
            ..Default::default()
        });
        assert_eq!(keywords, vec!["rust".to_string()]);
        assert_eq!(options.domain, "example.com");
        assert_eq!(options.country, "US");
        assert_eq!(options.language, "en");
        assert_eq!(options.device, Device::Desktop);
        assert_eq!(options.max_results, 100);
    }

    #[test]
    fn test_normalize_request_empty_optionals_never_fail() {
        let (keywords, options) = normalize_request(TrackRequest {
            keywords: Vec::new(),
            domain: "example.com".into(),
            country: Some(String::new()),
            language: Some("  ".into()),
            city: Some("".into()),
            api_key: Some("  ".into()),
            ..Default::default()
        });
        assert!(keywords.is_empty());
        assert_eq!(options.country, "US");
        assert_eq!(options.language, "en");
        assert!(options.city.is_none());
        assert!(options.api_key.is_none());
    }

    #[test]
    fn test_single_insight_bands() {
        assert!(single_insight(&record("kw", Some(3))).contains("first page"));
        assert!(single_insight(&record("kw", Some(15))).contains("page two"));
        assert!(single_insight(&record("kw", Some(35))).contains("top 50"));
        assert!(single_insight(&record("kw", Some(80))).contains("beyond the top 50"));
        assert!(single_insight(&record("kw", None)).contains("not found"));
    }

    #[test]
    fn test_bulk_insight_bands() {
        // 8/10 found = 80% -> strong.
        let records: Vec<RankingRecord> =
            (0..8).map(|i| record(&format!("kw{i}"), Some(i + 1))).collect();
        assert!(bulk_insight(&bulk_result(records, 10)).starts_with("strong"));

        // 5/10 found = 50% -> moderate.
        let records: Vec<RankingRecord> =
            (0..5).map(|i| record(&format!("kw{i}"), Some(i + 1))).collect();
        assert!(bulk_insight(&bulk_result(records, 10)).starts_with("moderate"));

        // 1/10 found -> weak.
        let records = vec![record("kw", Some(1))];
        assert!(bulk_insight(&bulk_result(records, 10)).starts_with("weak"));

        // Empty run.
        assert_eq!(bulk_insight(&bulk_result(Vec::new(), 0)), "no keywords to process");
    }
}
