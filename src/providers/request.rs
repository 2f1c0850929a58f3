//! Provider request-URL construction.

use url::Url;

use crate::error_handling::{ErrorKind, TrackError};
use crate::models::{Credential, SearchOptions};

use super::country::country_name;

/// Largest page the custom-search provider serves per request.
const CUSTOM_SEARCH_PAGE_CAP: u32 = 10;

/// Builds the native-SERP request URL.
///
/// Carries the fixed parameter set (`engine=google`, `safe=off`, `filter=0`,
/// `no_cache=true`, `start=0`) plus the geographic context. The composite
/// `location` string is built from city/state/country-name with the postal
/// code appended; when every part is empty the parameter is omitted and the
/// query runs keyword-only.
pub fn build_native_serp_url(
    endpoint: &str,
    credential: &Credential,
    keyword: &str,
    options: &SearchOptions,
) -> Result<Url, TrackError> {
    let mut url = parse_endpoint(endpoint)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("engine", "google")
            .append_pair("q", keyword)
            .append_pair("api_key", &credential.secret)
            .append_pair("gl", &options.country.to_lowercase())
            .append_pair("hl", &options.language)
            .append_pair("num", &options.max_results.to_string())
            .append_pair("start", "0")
            .append_pair("device", options.device.as_str())
            .append_pair("safe", "off")
            .append_pair("filter", "0")
            .append_pair("no_cache", "true");

        if let Some(location) = composite_location(options) {
            query.append_pair("location", &location);
        }
        for (key, value) in &options.extra_params {
            query.append_pair(key, value);
        }
    }
    Ok(url)
}

/// Builds the custom-search request URL.
///
/// The provider has no location parameter, so a configured city (and state)
/// are folded into the query text instead. Page size caps at 10.
pub fn build_custom_search_url(
    endpoint: &str,
    credential: &Credential,
    keyword: &str,
    options: &SearchOptions,
) -> Result<Url, TrackError> {
    let engine_id = credential.search_engine_id.as_deref().ok_or_else(|| {
        TrackError::new(
            ErrorKind::InvalidRequest,
            "custom_search credential is missing a search engine id",
        )
    })?;

    let mut query_text = keyword.to_string();
    if let Some(city) = non_empty(&options.city) {
        query_text.push(' ');
        query_text.push_str(city);
        if let Some(state) = non_empty(&options.state) {
            query_text.push(' ');
            query_text.push_str(state);
        }
    }

    let mut url = parse_endpoint(endpoint)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("key", &credential.secret)
            .append_pair("cx", engine_id)
            .append_pair("q", &query_text)
            .append_pair(
                "num",
                &options.max_results.min(CUSTOM_SEARCH_PAGE_CAP).to_string(),
            )
            .append_pair("gl", &options.country.to_lowercase())
            .append_pair("hl", &options.language)
            .append_pair("safe", "off");
        for (key, value) in &options.extra_params {
            query.append_pair(key, value);
        }
    }
    Ok(url)
}

fn parse_endpoint(endpoint: &str) -> Result<Url, TrackError> {
    Url::parse(endpoint).map_err(|e| {
        TrackError::with_source(
            ErrorKind::InvalidRequest,
            format!("malformed provider endpoint: {endpoint}"),
            e,
        )
    })
}

/// "City, State, Country-Name[, Postal]" with empty parts skipped; `None`
/// when nothing is set.
fn composite_location(options: &SearchOptions) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(city) = non_empty(&options.city) {
        parts.push(city);
    }
    if let Some(state) = non_empty(&options.state) {
        parts.push(state);
    }
    let country = country_name(&options.country);
    if !country.is_empty() {
        parts.push(country);
    }
    if let Some(postal) = non_empty(&options.postal_code) {
        parts.push(postal);
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
