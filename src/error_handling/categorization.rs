//! Error categorization.
//!
//! Maps HTTP statuses, transport-level failures, and provider error messages
//! onto `ErrorKind`. All three call sites (pool attempts, credential probes,
//! bulk failure accounting) go through these functions so the recovery policy
//! stays in one place.

use super::types::ErrorKind;

/// Categorizes an HTTP status plus the provider's error message, if any.
///
/// The message is consulted before the status family: some providers return
/// quota and rate-limit conditions under generic 4xx codes with the real
/// condition only in the body.
pub fn classify_status(status: u16, message: Option<&str>) -> ErrorKind {
    if let Some(kind) = message.and_then(classify_provider_message) {
        return kind;
    }

    match status {
        400 => ErrorKind::InvalidRequest,
        401 => ErrorKind::Unauthorized,
        402 | 403 => ErrorKind::QuotaExceeded,
        429 => ErrorKind::RateLimited,
        s if (500..600).contains(&s) => ErrorKind::NetworkError,
        _ => ErrorKind::Unknown,
    }
}

/// Categorizes a provider error message by its content.
///
/// Returns `None` when the message matches no known condition.
pub fn classify_provider_message(message: &str) -> Option<ErrorKind> {
    let lower = message.to_lowercase();

    if lower.contains("rate limit") || lower.contains("too many") {
        return Some(ErrorKind::RateLimited);
    }
    if lower.contains("quota")
        || lower.contains("limit")
        || lower.contains("exceeded")
        || lower.contains("used up")
    {
        return Some(ErrorKind::QuotaExceeded);
    }
    if lower.contains("unauthorized") || lower.contains("invalid api key") {
        return Some(ErrorKind::Unauthorized);
    }
    None
}

/// Categorizes a `reqwest::Error` from a failed request.
pub fn classify_reqwest_error(error: &reqwest::Error) -> ErrorKind {
    if let Some(status) = error.status() {
        return classify_status(status.as_u16(), None);
    }

    if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_connect() || error.is_request() {
        ErrorKind::NetworkError
    } else if error.is_decode() || error.is_body() {
        ErrorKind::ParseError
    } else if error.is_builder() {
        ErrorKind::InvalidRequest
    } else {
        ErrorKind::Unknown
    }
}
