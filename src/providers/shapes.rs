//! Provider response shapes.
//!
//! Both families deserialize tolerantly: every field is optional or
//! defaulted, because providers drop blocks freely depending on the query.
//! Feature blocks we only count (ads, images, videos) stay as raw
//! `serde_json::Value`s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Native-SERP response (provider A).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NativeSerpResponse {
    #[serde(default)]
    pub organic_results: Vec<OrganicResult>,
    #[serde(default)]
    pub ads: Vec<Value>,
    #[serde(default)]
    pub answer_box: Option<Value>,
    #[serde(default)]
    pub knowledge_graph: Option<Value>,
    #[serde(default)]
    pub local_results: Option<LocalResults>,
    #[serde(default)]
    pub inline_images: Vec<Value>,
    #[serde(default)]
    pub inline_videos: Vec<Value>,
    #[serde(default)]
    pub related_searches: Vec<Value>,
    #[serde(default)]
    pub related_questions: Vec<RelatedQuestion>,
    #[serde(default)]
    pub search_information: Option<SearchInformation>,
    #[serde(default)]
    pub search_metadata: Option<RawSearchMetadata>,
    /// Present when the provider rejects the request in-band.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LocalResults {
    #[serde(default)]
    pub places: Vec<Value>,
}

/// People-also-ask block. `block_position` is the zero-based slot in the
/// organic flow where the block renders, when the provider reports it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RelatedQuestion {
    #[serde(default)]
    pub block_position: Option<usize>,
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchInformation {
    /// Number or string; some providers report "About 1,240,000 results".
    #[serde(default)]
    pub total_results: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSearchMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub total_time_taken: Option<f64>,
}

/// Custom-search response (provider B).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CustomSearchResponse {
    #[serde(default)]
    pub items: Vec<CustomSearchItem>,
    #[serde(default, rename = "searchInformation")]
    pub search_information: Option<CustomSearchInformation>,
    #[serde(default)]
    pub error: Option<CustomSearchError>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CustomSearchItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CustomSearchInformation {
    #[serde(default, rename = "totalResults")]
    pub total_results: Option<String>,
    #[serde(default, rename = "searchTime")]
    pub search_time: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CustomSearchError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_shape_tolerates_missing_blocks() {
        let parsed: NativeSerpResponse = serde_json::from_str(
            r#"{"organic_results":[{"position":1,"link":"https://example.com"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.organic_results.len(), 1);
        assert!(parsed.ads.is_empty());
        assert!(parsed.answer_box.is_none());
        assert!(parsed.search_information.is_none());
    }

    #[test]
    fn test_total_results_accepts_number_or_string() {
        let as_number: NativeSerpResponse =
            serde_json::from_str(r#"{"search_information":{"total_results":1240000}}"#).unwrap();
        assert!(as_number
            .search_information
            .unwrap()
            .total_results
            .unwrap()
            .is_number());

        let as_string: NativeSerpResponse = serde_json::from_str(
            r#"{"search_information":{"total_results":"About 1,240,000 results"}}"#,
        )
        .unwrap();
        assert!(as_string
            .search_information
            .unwrap()
            .total_results
            .unwrap()
            .is_string());
    }

    #[test]
    fn test_custom_search_camel_case_fields() {
        let parsed: CustomSearchResponse = serde_json::from_str(
            r#"{"items":[{"title":"t","link":"https://example.com","snippet":"s"}],
                "searchInformation":{"totalResults":"42","searchTime":0.2}}"#,
        )
        .unwrap();
        assert_eq!(parsed.items.len(), 1);
        let info = parsed.search_information.unwrap();
        assert_eq!(info.total_results.as_deref(), Some("42"));
    }
}
