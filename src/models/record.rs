//! Ranking records and bulk-result shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error_handling::ErrorKind;

use super::credential::{PoolStats, Provider};
use super::options::Device;

/// Provenance of a reported position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    /// The provider supplied an explicit position field.
    ProviderField,
    /// Derived from the result's index in the organic array.
    ArrayIndexFallback,
    /// Provider position confirmed against the array index.
    CrossVerified,
    Unknown,
}

/// A non-organic block detected on the results page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerpFeatureKind {
    Ads,
    FeaturedSnippet,
    KnowledgePanel,
    LocalPack,
    Images,
    Videos,
    RelatedSearches,
    PeopleAlsoAsk,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerpFeature {
    pub kind: SerpFeatureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
}

impl SerpFeature {
    pub fn new(kind: SerpFeatureKind) -> Self {
        SerpFeature {
            kind,
            count: None,
            anchor: None,
        }
    }

    pub fn with_count(kind: SerpFeatureKind, count: u32) -> Self {
        SerpFeature {
            kind,
            count: Some(count),
            anchor: None,
        }
    }
}

/// How trustworthy the reported position is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    High,
    Medium,
    Low,
}

impl Reliability {
    /// Band thresholds: >= 90 high, >= 70 medium, else low.
    pub fn from_confidence(confidence: u8) -> Self {
        if confidence >= 90 {
            Reliability::High
        } else if confidence >= 70 {
            Reliability::Medium
        } else {
            Reliability::Low
        }
    }
}

/// Position provenance and quality sub-record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionValidation {
    pub original_position: Option<u32>,
    pub verified_position: Option<u32>,
    pub position_source: PositionSource,
    /// 0..100.
    pub confidence: u8,
    pub serp_features: Vec<SerpFeature>,
    pub organic_count: u32,
    /// Organic results plus detected non-organic blocks.
    pub total_items: u32,
    pub validation_method: String,
    pub warnings: Vec<String>,
    /// One-based index of the matched result in the organic array.
    pub array_index_position: Option<u32>,
}

/// Echo of the geographic/device context the lookup ran under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLocation {
    pub country: String,
    pub language: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub device: Device,
}

/// Provider- and request-level metadata attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub provider: Provider,
    /// Credential that served the request; absent for user-supplied secrets.
    pub credential_id: Option<String>,
    /// Provider-side request id, when reported.
    pub provider_request_id: Option<String>,
    /// Provider-reported upstream processing time, seconds.
    pub upstream_time_s: Option<f64>,
    /// Local wall-clock spent on the lookup, milliseconds.
    pub processing_time_ms: Option<u64>,
}

/// One competitor entry from the organic list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorEntry {
    pub position: u32,
    pub url: String,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// The canonical outcome of a single keyword lookup. Append-only: created
/// per lookup, persisted, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingRecord {
    pub keyword: String,
    pub target_domain: String,
    pub position: Option<u32>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub location: SearchLocation,
    pub total_results: u64,
    pub organic_count: u32,
    pub checked_at: DateTime<Utc>,
    pub found: bool,
    pub validation: PositionValidation,
    pub metadata: SearchMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
    pub competitors: Vec<CompetitorEntry>,
    pub reliability: Reliability,
}

/// A keyword that could not be resolved, with its failure category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedLookup {
    pub keyword: String,
    pub error: String,
    pub kind: ErrorKind,
    pub at: DateTime<Utc>,
    pub retry_count: u32,
    pub credential_id: Option<String>,
}

/// Reliability distribution across a bulk run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityHistogram {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl QualityHistogram {
    pub fn add(&mut self, reliability: Reliability) {
        match reliability {
            Reliability::High => self.high += 1,
            Reliability::Medium => self.medium += 1,
            Reliability::Low => self.low += 1,
        }
    }
}

/// Outcome of a bulk keyword run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResult {
    pub total_processed: usize,
    pub records: Vec<RankingRecord>,
    pub failures: Vec<FailedLookup>,
    pub elapsed_ms: u64,
    pub pool: PoolStats,
    pub quality: QualityHistogram,
}
