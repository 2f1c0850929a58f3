//! Provider response parsing.
//!
//! Turns a raw provider payload into a canonical `RankingRecord` with a
//! provenance-tagged position. Dispatches on the provider tag: the native
//! SERP shape carries explicit positions and feature blocks, the custom
//! search shape is a flat item list where position is always derived from
//! the array index.

use chrono::Utc;
use serde_json::Value;

use crate::domain_match::{extract_domain, match_domains, MatchType};
use crate::error_handling::{classify_provider_message, classify_status, ErrorKind, TrackError};
use crate::models::{
    CompetitorEntry, PositionSource, PositionValidation, Provider, RankingRecord, Reliability,
    SearchLocation, SearchMetadata, SearchOptions, SerpFeature, SerpFeatureKind,
};
use crate::providers::shapes::{CustomSearchResponse, NativeSerpResponse, OrganicResult};

/// Provider positions further than this from the array index draw a warning.
const POSITION_DISCREPANCY_WARN: i64 = 3;
/// At most this many competitor entries are emitted per record.
const COMPETITOR_CAP: usize = 10;

/// Request-level context the parser folds into the record's metadata.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub provider: Provider,
    pub credential_id: Option<String>,
    pub processing_time_ms: Option<u64>,
}

/// Parses a raw provider payload into a canonical ranking record.
pub fn parse_response(
    keyword: &str,
    raw: &Value,
    options: &SearchOptions,
    meta: &RequestMeta,
) -> Result<RankingRecord, TrackError> {
    match meta.provider {
        Provider::NativeSerp => parse_native(keyword, raw, options, meta),
        Provider::CustomSearch => parse_custom(keyword, raw, options, meta),
    }
}

/// The organic result the matcher settled on.
struct BestMatch {
    /// Zero-based index in the organic array.
    index: usize,
    confidence: u8,
    has_position: bool,
}

fn parse_native(
    keyword: &str,
    raw: &Value,
    options: &SearchOptions,
    meta: &RequestMeta,
) -> Result<RankingRecord, TrackError> {
    let resp: NativeSerpResponse = serde_json::from_value(raw.clone()).map_err(|e| {
        TrackError::with_source(ErrorKind::ParseError, "malformed native SERP body", e)
    })?;

    if let Some(message) = &resp.error {
        let kind = classify_provider_message(message).unwrap_or(ErrorKind::Unknown);
        return Err(TrackError::new(kind, message.clone()));
    }
    let Some(search_information) = &resp.search_information else {
        return Err(TrackError::new(
            ErrorKind::ParseError,
            "response body is missing search_information",
        ));
    };

    let organic = &resp.organic_results;
    let organic_count = organic.len() as u32;
    let features = detect_features(&resp);
    let total_items = organic_count + features.iter().map(|f| f.count.unwrap_or(1)).sum::<u32>();
    let total_results = parse_total_results(search_information.total_results.as_ref());

    let best = select_best_match(organic, &options.domain);

    let mut warnings: Vec<String> = Vec::new();
    let mut position: Option<u32> = None;
    let mut source = PositionSource::Unknown;
    let mut array_index_position: Option<u32> = None;
    let mut validation_method = "no_match".to_string();
    let mut matched_result: Option<&OrganicResult> = None;

    if let Some(best) = &best {
        let result = &organic[best.index];
        matched_result = Some(result);
        let one_based_index = best.index as u32 + 1;
        array_index_position = Some(one_based_index);

        match result.position.filter(|p| *p >= 1) {
            Some(provider_position) => {
                position = Some(provider_position);
                source = PositionSource::ProviderField;
                validation_method = "provider_field".to_string();
                let discrepancy =
                    (i64::from(provider_position) - i64::from(one_based_index)).abs();
                if discrepancy > POSITION_DISCREPANCY_WARN {
                    warnings.push(format!(
                        "provider position {provider_position} diverges from array index {one_based_index} by {discrepancy}"
                    ));
                }
            }
            None => {
                let offset = feature_offset(&resp, best.index);
                position = Some(one_based_index + offset);
                source = PositionSource::ArrayIndexFallback;
                validation_method = "array_index_fallback".to_string();
                warnings.push(format!(
                    "no provider position; derived from array index {one_based_index} plus {offset} leading feature slots"
                ));
            }
        }
    }

    let found = position.is_some();
    let original_position = position;
    let mut verified_position = None;

    if options.verify_position && found {
        let reported = position.expect("found implies position");
        let array_index = array_index_position.expect("found implies array index");
        let expected = expected_discrepancy(&resp);
        let discrepancy = (i64::from(reported) - i64::from(array_index)).abs();
        if discrepancy <= expected + 2 {
            verified_position = Some(reported);
            source = PositionSource::CrossVerified;
            validation_method = "cross_verified".to_string();
        } else {
            verified_position = Some(reported);
            warnings.push(format!(
                "position discrepancy {discrepancy} exceeds expected {expected} from visible features"
            ));
        }
    }

    let confidence = compute_confidence(
        source,
        features.len(),
        organic_count,
        warnings.len(),
        found,
    );

    let validation = PositionValidation {
        original_position,
        verified_position,
        position_source: source,
        confidence,
        serp_features: features,
        organic_count,
        total_items,
        validation_method,
        warnings,
        array_index_position,
    };

    let metadata = SearchMetadata {
        provider: Provider::NativeSerp,
        credential_id: meta.credential_id.clone(),
        provider_request_id: resp
            .search_metadata
            .as_ref()
            .and_then(|m| m.id.clone()),
        upstream_time_s: resp
            .search_metadata
            .as_ref()
            .and_then(|m| m.total_time_taken),
        processing_time_ms: meta.processing_time_ms,
    };

    Ok(assemble_record(
        keyword,
        options,
        matched_result.map(|r| (r.link.clone(), r.title.clone(), r.snippet.clone())),
        position,
        found,
        total_results,
        organic_count,
        validation,
        metadata,
        native_competitors(organic),
        if options.include_raw_response {
            Some(raw.clone())
        } else {
            None
        },
    ))
}

fn parse_custom(
    keyword: &str,
    raw: &Value,
    options: &SearchOptions,
    meta: &RequestMeta,
) -> Result<RankingRecord, TrackError> {
    let resp: CustomSearchResponse = serde_json::from_value(raw.clone()).map_err(|e| {
        TrackError::with_source(ErrorKind::ParseError, "malformed custom search body", e)
    })?;

    if let Some(error) = &resp.error {
        let message = error.message.clone().unwrap_or_else(|| "provider error".into());
        let status = error.code.and_then(|c| u16::try_from(c).ok()).unwrap_or(0);
        return Err(TrackError::new(
            classify_status(status, Some(&message)),
            message,
        ));
    }

    let organic_count = resp.items.len() as u32;
    let total_results = resp
        .search_information
        .as_ref()
        .and_then(|info| info.total_results.as_deref())
        .map(|s| first_digit_run(&s.replace(',', "")))
        .unwrap_or(0);

    let mut best: Option<(usize, u8)> = None;
    for (index, item) in resp.items.iter().enumerate() {
        let Some(link) = item.link.as_deref() else {
            continue;
        };
        let domain = extract_domain(link);
        if domain.is_empty() {
            continue;
        }
        let matched = match_domains(&domain, &options.domain);
        if !matched.matched {
            continue;
        }
        let better = best.map_or(true, |(_, conf)| matched.confidence > conf);
        if better {
            best = Some((index, matched.confidence));
        }
        if matched.match_type == MatchType::Exact {
            break;
        }
    }

    let found = best.is_some();
    let position = best.map(|(index, _)| index as u32 + 1);
    let source = if found {
        PositionSource::ArrayIndexFallback
    } else {
        PositionSource::Unknown
    };
    let confidence = compute_confidence(source, 0, organic_count, 0, found);

    let validation = PositionValidation {
        original_position: position,
        verified_position: None,
        position_source: source,
        confidence,
        serp_features: Vec::new(),
        organic_count,
        total_items: organic_count,
        validation_method: if found {
            "array_index_fallback".to_string()
        } else {
            "no_match".to_string()
        },
        warnings: Vec::new(),
        array_index_position: position,
    };

    let metadata = SearchMetadata {
        provider: Provider::CustomSearch,
        credential_id: meta.credential_id.clone(),
        provider_request_id: None,
        upstream_time_s: resp
            .search_information
            .as_ref()
            .and_then(|info| info.search_time),
        processing_time_ms: meta.processing_time_ms,
    };

    let matched_fields = best.map(|(index, _)| {
        let item = &resp.items[index];
        (item.link.clone(), item.title.clone(), item.snippet.clone())
    });

    let competitors = resp
        .items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let link = item.link.clone()?;
            Some(CompetitorEntry {
                position: index as u32 + 1,
                domain: extract_domain(&link),
                url: link,
                title: item.title.clone(),
            })
        })
        .take(COMPETITOR_CAP)
        .collect();

    Ok(assemble_record(
        keyword,
        options,
        matched_fields,
        position,
        found,
        total_results,
        organic_count,
        validation,
        metadata,
        competitors,
        if options.include_raw_response {
            Some(raw.clone())
        } else {
            None
        },
    ))
}

/// Picks the organic result representing the target domain.
///
/// Highest match confidence wins; on a tie a result carrying a provider
/// position is preferred; on a further tie the earliest index stands.
/// Iteration short-circuits only when an exact match also carries a valid
/// provider position — an exact match without one keeps scanning so a
/// positioned result can still win the tie-breaker.
fn select_best_match(organic: &[OrganicResult], target: &str) -> Option<BestMatch> {
    let mut best: Option<BestMatch> = None;
    for (index, result) in organic.iter().enumerate() {
        let Some(link) = result.link.as_deref() else {
            continue;
        };
        let domain = extract_domain(link);
        if domain.is_empty() {
            continue;
        }
        let matched = match_domains(&domain, target);
        if !matched.matched {
            continue;
        }
        let has_position = result.position.is_some_and(|p| p >= 1);
        let better = match &best {
            None => true,
            Some(current) => {
                matched.confidence > current.confidence
                    || (matched.confidence == current.confidence
                        && has_position
                        && !current.has_position)
            }
        };
        if better {
            best = Some(BestMatch {
                index,
                confidence: matched.confidence,
                has_position,
            });
        }
        if matched.match_type == MatchType::Exact && has_position {
            break;
        }
    }
    best
}

/// SERP features present on the page, with counts where the block has them.
fn detect_features(resp: &NativeSerpResponse) -> Vec<SerpFeature> {
    let mut features = Vec::new();
    if !resp.ads.is_empty() {
        features.push(SerpFeature::with_count(
            SerpFeatureKind::Ads,
            resp.ads.len() as u32,
        ));
    }
    if resp.answer_box.is_some() {
        features.push(SerpFeature::new(SerpFeatureKind::FeaturedSnippet));
    }
    if resp.knowledge_graph.is_some() {
        features.push(SerpFeature::new(SerpFeatureKind::KnowledgePanel));
    }
    if let Some(local) = &resp.local_results {
        features.push(SerpFeature::with_count(
            SerpFeatureKind::LocalPack,
            local.places.len() as u32,
        ));
    }
    if !resp.inline_images.is_empty() {
        features.push(SerpFeature::with_count(
            SerpFeatureKind::Images,
            resp.inline_images.len() as u32,
        ));
    }
    if !resp.inline_videos.is_empty() {
        features.push(SerpFeature::with_count(
            SerpFeatureKind::Videos,
            resp.inline_videos.len() as u32,
        ));
    }
    if !resp.related_searches.is_empty() {
        features.push(SerpFeature::with_count(
            SerpFeatureKind::RelatedSearches,
            resp.related_searches.len() as u32,
        ));
    }
    if !resp.related_questions.is_empty() {
        features.push(SerpFeature::with_count(
            SerpFeatureKind::PeopleAlsoAsk,
            resp.related_questions.len() as u32,
        ));
    }
    features
}

/// Number of non-organic slots rendered above the matched result: all ads,
/// the answer box, the local pack, and any people-also-ask blocks whose
/// reported slot falls before the match.
fn feature_offset(resp: &NativeSerpResponse, match_index: usize) -> u32 {
    let mut offset = resp.ads.len() as u32;
    if resp.answer_box.is_some() {
        offset += 1;
    }
    if let Some(local) = &resp.local_results {
        offset += local.places.len() as u32;
    }
    offset += resp
        .related_questions
        .iter()
        .filter(|q| q.block_position.is_some_and(|slot| slot < match_index))
        .count() as u32;
    offset
}

/// How far a provider position may drift from the array index given the
/// visible feature blocks.
fn expected_discrepancy(resp: &NativeSerpResponse) -> i64 {
    let mut expected = resp.ads.len() as i64;
    if resp.answer_box.is_some() {
        expected += 1;
    }
    if resp.local_results.is_some() {
        expected += 1;
    }
    expected
}

/// The confidence formula. Deterministic in (source, feature count, organic
/// count, warning count); an unfound record is always 0.
fn compute_confidence(
    source: PositionSource,
    feature_count: usize,
    organic_count: u32,
    warning_count: usize,
    found: bool,
) -> u8 {
    if !found {
        return 0;
    }
    let mut confidence: i32 = 100;
    match source {
        PositionSource::ArrayIndexFallback => confidence -= 30,
        PositionSource::Unknown => confidence -= 50,
        PositionSource::ProviderField | PositionSource::CrossVerified => {}
    }
    confidence -= (5 * feature_count as i32).min(20);
    if organic_count < 10 {
        confidence -= 10;
    }
    confidence -= (5 * warning_count as i32).min(15);
    confidence.clamp(0, 100) as u8
}

/// First 10 organic entries carrying both a link and a position.
fn native_competitors(organic: &[OrganicResult]) -> Vec<CompetitorEntry> {
    organic
        .iter()
        .filter_map(|result| {
            let link = result.link.clone()?;
            let position = result.position?;
            Some(CompetitorEntry {
                position,
                domain: extract_domain(&link),
                url: link,
                title: result.title.clone(),
            })
        })
        .take(COMPETITOR_CAP)
        .collect()
}

/// Number-or-string total-results field. Comma separators are stripped
/// before taking the first contiguous digit run, so "About 1,240,000
/// results" parses as 1240000; a missing field is 0.
fn parse_total_results(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => first_digit_run(&s.replace(',', "")),
        _ => 0,
    }
}

fn first_digit_run(s: &str) -> u64 {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

#[allow(clippy::too_many_arguments)]
fn assemble_record(
    keyword: &str,
    options: &SearchOptions,
    matched: Option<(Option<String>, Option<String>, Option<String>)>,
    position: Option<u32>,
    found: bool,
    total_results: u64,
    organic_count: u32,
    validation: PositionValidation,
    metadata: SearchMetadata,
    competitors: Vec<CompetitorEntry>,
    raw_response: Option<Value>,
) -> RankingRecord {
    let (url, title, snippet) = matched.unwrap_or((None, None, None));
    let reliability = Reliability::from_confidence(validation.confidence);
    RankingRecord {
        keyword: keyword.to_string(),
        target_domain: options.domain.clone(),
        position,
        url,
        title,
        snippet,
        location: SearchLocation {
            country: options.country.clone(),
            language: options.language.clone(),
            city: options.city.clone(),
            state: options.state.clone(),
            postal_code: options.postal_code.clone(),
            device: options.device,
        },
        total_results,
        organic_count,
        checked_at: Utc::now(),
        found,
        validation,
        metadata,
        raw_response,
        competitors,
        reliability,
    }
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
