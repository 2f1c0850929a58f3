//! Single lookup attempt against a provider.
//!
//! Each attempt resolves to a typed outcome; the retry loop in `track`
//! decides what to do from the tag instead of catching errors.

use std::time::Instant;

use serde_json::Value;

use crate::error_handling::{classify_reqwest_error, classify_status, ErrorKind};
use crate::models::{Credential, Provider, RankingRecord, SearchOptions};
use crate::parser::{parse_response, RequestMeta};
use crate::providers::{build_custom_search_url, build_native_serp_url, harvest_usage, AccountUsage};

use super::SearchApiPool;

/// Pseudo-credential id used for user-supplied secrets; never enters the
/// pool or the store.
pub(crate) const USER_KEY_ID: &str = "user_supplied";

/// Outcome of one attempt.
pub(crate) enum AttemptOutcome {
    /// Parsed record plus any account usage the provider reported.
    Success(Box<RankingRecord>, Option<AccountUsage>),
    /// Rotate to another credential.
    Retryable { kind: ErrorKind, message: String },
    /// Fail the lookup immediately.
    Fatal { kind: ErrorKind, message: String },
}

impl AttemptOutcome {
    fn from_kind(kind: ErrorKind, message: String) -> Self {
        if kind.is_retryable() {
            AttemptOutcome::Retryable { kind, message }
        } else {
            AttemptOutcome::Fatal { kind, message }
        }
    }
}

impl SearchApiPool {
    /// Executes one HTTP request with the per-request deadline and parses
    /// the response. Never touches pool state; counter updates belong to
    /// the caller.
    pub(crate) async fn execute_attempt(
        &self,
        credential: &Credential,
        keyword: &str,
        options: &SearchOptions,
        started: Instant,
    ) -> AttemptOutcome {
        let url = match credential.provider {
            Provider::NativeSerp => build_native_serp_url(
                &self.settings.native_serp_endpoint,
                credential,
                keyword,
                options,
            ),
            Provider::CustomSearch => build_custom_search_url(
                &self.settings.custom_search_endpoint,
                credential,
                keyword,
                options,
            ),
        };
        let url = match url {
            Ok(url) => url,
            Err(e) => return AttemptOutcome::from_kind(e.kind, e.message),
        };

        let response = match self
            .client
            .get(url)
            .timeout(self.settings.request_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let kind = if e.is_timeout() {
                    ErrorKind::Timeout
                } else {
                    classify_reqwest_error(&e)
                };
                return AttemptOutcome::from_kind(kind, format!("request failed: {e}"));
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return AttemptOutcome::from_kind(
                    ErrorKind::ParseError,
                    format!("failed to read response body: {e}"),
                )
            }
        };

        if !status.is_success() {
            let message = extract_error_message(&body)
                .unwrap_or_else(|| format!("provider returned HTTP {}", status.as_u16()));
            let kind = classify_status(status.as_u16(), Some(&message));
            return AttemptOutcome::from_kind(kind, message);
        }

        let raw: Value = match serde_json::from_str(&body) {
            Ok(raw) => raw,
            Err(e) => {
                return AttemptOutcome::from_kind(
                    ErrorKind::ParseError,
                    format!("provider body is not valid JSON: {e}"),
                )
            }
        };

        let meta = RequestMeta {
            provider: credential.provider,
            credential_id: if credential.id == USER_KEY_ID {
                None
            } else {
                Some(credential.id.clone())
            },
            processing_time_ms: Some(started.elapsed().as_millis() as u64),
        };

        match parse_response(keyword, &raw, options, &meta) {
            Ok(record) => AttemptOutcome::Success(Box::new(record), harvest_usage(&headers)),
            Err(e) => AttemptOutcome::from_kind(e.kind, e.message),
        }
    }
}

/// Pulls a human-readable error message out of an error body, either shape:
/// `{"error": "..."}` or `{"error": {"message": "..."}}`.
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from),
        _ => None,
    }
}
