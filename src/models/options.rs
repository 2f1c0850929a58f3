//! Per-lookup search options.

use std::collections::HashMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::credential::Provider;

/// Device the SERP should be rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Desktop => "desktop",
            Device::Mobile => "mobile",
            Device::Tablet => "tablet",
        }
    }
}

/// Options for a single keyword lookup.
///
/// `domain` is free-form; the domain matcher normalizes it. `country` is
/// ISO-3166 alpha-2, `language` ISO-639 alpha-2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub domain: String,
    pub country: String,
    pub language: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub device: Device,
    /// Provider-capped; custom search serves at most 10 per request.
    pub max_results: u32,
    /// Cross-check provider positions against array indices.
    pub verify_position: bool,
    /// A user-supplied secret bypasses the pool entirely.
    pub api_key: Option<String>,
    /// Overrides the default provider for this lookup.
    pub provider: Option<Provider>,
    /// Passed through to the provider query string as-is.
    pub extra_params: HashMap<String, String>,
    /// Attach the raw provider payload to the record for debugging.
    pub include_raw_response: bool,
}

impl SearchOptions {
    pub fn for_domain(domain: impl Into<String>) -> Self {
        SearchOptions {
            domain: domain.into(),
            ..Default::default()
        }
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            domain: String::new(),
            country: "US".to_string(),
            language: "en".to_string(),
            city: None,
            state: None,
            postal_code: None,
            device: Device::Desktop,
            max_results: 100,
            verify_position: false,
            api_key: None,
            provider: None,
            extra_params: HashMap::new(),
            include_raw_response: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = SearchOptions::for_domain("example.com");
        assert_eq!(opts.domain, "example.com");
        assert_eq!(opts.country, "US");
        assert_eq!(opts.language, "en");
        assert_eq!(opts.device, Device::Desktop);
        assert_eq!(opts.max_results, 100);
        assert!(!opts.verify_position);
        assert!(opts.api_key.is_none());
        assert!(opts.provider.is_none());
    }
}
