//! Error classification for failed upstream calls.
//!
//! HTTP status codes decide first when the upstream sent one. Otherwise the category is inferred
//! from lowercase substrings of the error text. Transport failures never count as credential
//! failures: their text carries the request URL, whose port or path can contain any digits.

use super::types::{ClientError, ErrorKind};
use reqwest::StatusCode;

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "quota",
    "too many requests",
    "resource_exhausted",
    "resource has been exhausted",
    "429",
];

// Bare "invalid" is not an auth marker; plain bad-request errors use it too.
const AUTH_MARKERS: &[&str] = &[
    "api key",
    "api_key",
    "unauthorized",
    "unauthenticated",
    "permission_denied",
    "401",
    "403",
];

/// Classify a failed client call.
pub fn classify_client_error(error: &ClientError) -> ErrorKind {
    match error {
        ClientError::UnexpectedStatus { status, body } => {
            status_kind(*status).unwrap_or_else(|| classify_error(body))
        }
        ClientError::Http(error) => error
            .status()
            .and_then(status_kind)
            .unwrap_or(ErrorKind::Other),
        ClientError::InvalidResponse(message) | ClientError::Message(message) => {
            classify_error(message)
        }
    }
}

fn status_kind(status: StatusCode) -> Option<ErrorKind> {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Some(ErrorKind::RateLimit),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(ErrorKind::Auth),
        _ => None,
    }
}

/// Classify an upstream error message. Rate-limit markers win over auth markers.
pub fn classify_error(message: &str) -> ErrorKind {
    let normalized = message.to_lowercase();
    if RATE_LIMIT_MARKERS
        .iter()
        .any(|marker| normalized.contains(marker))
    {
        ErrorKind::RateLimit
    } else if AUTH_MARKERS.iter().any(|marker| normalized.contains(marker)) {
        ErrorKind::Auth
    } else {
        ErrorKind::Other
    }
}
