//! Account-usage response headers.
//!
//! Some plans report account consumption on every response, either as a
//! combined `x-api-usage: used/limit` value or as separate counters. When
//! present, the pool reconciles the serving credential's monthly counters
//! against these numbers.

use reqwest::header::HeaderMap;

/// Header carrying "used/limit" in one value.
const COMBINED_USAGE_HEADERS: &[&str] = &["x-api-usage", "x-account-usage"];

const USED_HEADERS: &[&str] = &["x-searches-used", "x-api-searches-used"];
const REMAINING_HEADERS: &[&str] = &["x-searches-remaining", "x-api-searches-remaining"];
const LIMIT_HEADERS: &[&str] = &["x-monthly-limit", "x-api-monthly-limit"];

/// Account consumption as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountUsage {
    pub used: Option<u64>,
    pub remaining: Option<u64>,
    pub monthly_limit: Option<u64>,
}

impl AccountUsage {
    /// Used count, falling back to `limit - remaining` when only those two
    /// were reported.
    pub fn effective_used(&self) -> Option<u64> {
        self.used.or_else(|| {
            match (self.monthly_limit, self.remaining) {
                (Some(limit), Some(remaining)) => Some(limit.saturating_sub(remaining)),
                _ => None,
            }
        })
    }
}

/// Harvests account usage from response headers, if any are present.
pub fn harvest_usage(headers: &HeaderMap) -> Option<AccountUsage> {
    for name in COMBINED_USAGE_HEADERS {
        if let Some(value) = header_str(headers, name) {
            if let Some((used, limit)) = value.split_once('/') {
                let used = used.trim().parse::<u64>().ok();
                let limit = limit.trim().parse::<u64>().ok();
                if used.is_some() || limit.is_some() {
                    return Some(AccountUsage {
                        used,
                        remaining: None,
                        monthly_limit: limit,
                    });
                }
            }
        }
    }

    let used = first_numeric(headers, USED_HEADERS);
    let remaining = first_numeric(headers, REMAINING_HEADERS);
    let monthly_limit = first_numeric(headers, LIMIT_HEADERS);

    if used.is_none() && remaining.is_none() && monthly_limit.is_none() {
        return None;
    }
    Some(AccountUsage {
        used,
        remaining,
        monthly_limit,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn first_numeric(headers: &HeaderMap, names: &[&str]) -> Option<u64> {
    names
        .iter()
        .filter_map(|name| header_str(headers, name))
        .find_map(|value| value.trim().parse::<u64>().ok())
}
