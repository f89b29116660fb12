//! Shared types used by the generative-content client and the failover router.

use bytes::Bytes;
use reqwest::StatusCode;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors returned by a single credential's call against the upstream API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Upstream responded with an unexpected status code.
    #[error("Unexpected upstream response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the upstream API.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response body could not be interpreted.
    #[error("Malformed upstream response: {0}")]
    InvalidResponse(String),
    /// Adapter-specific failure described only by its message.
    #[error("{0}")]
    Message(String),
}

/// Coarse category of a failed upstream call, derived from the error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Quota exhausted or too many requests.
    RateLimit,
    /// Credential rejected.
    Auth,
    /// Anything else.
    Other,
}

/// Terminal failure of a routed call, surfaced only after failover options are exhausted.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Neither credential is configured.
    #[error("No API keys available")]
    NoCredentials,
    /// Every usable credential reported a rate limit.
    #[error("Both API keys are rate limited. Please try again later.")]
    BothExhaustedRateLimit,
    /// Every usable credential was rejected.
    #[error("API key authentication failed on both keys.")]
    BothExhaustedAuth,
    /// Non-credential upstream failure, propagated unchanged.
    #[error(transparent)]
    Upstream(#[from] ClientError),
}

impl UpstreamError {
    /// Stable machine-readable label for the error category.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCredentials => "no_credentials",
            Self::BothExhaustedRateLimit => "both_exhausted_rate_limit",
            Self::BothExhaustedAuth => "both_exhausted_auth",
            Self::Upstream(_) => "other_upstream_error",
        }
    }
}

/// Credential slot managed by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// Preferred credential.
    Primary,
    /// Fallback credential.
    Backup,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Backup => f.write_str("backup"),
        }
    }
}

/// Availability of a single credential as seen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    /// No credential was supplied for this slot.
    Unconfigured,
    /// Credential is usable.
    Active,
    /// Credential failed and is on probation.
    Failed,
}

/// One element of a multimodal request.
#[derive(Debug, Clone)]
pub enum ContentPart {
    /// Plain text instruction or context.
    Text(String),
    /// Binary payload sent inline; encoded by the client adapter.
    InlineData {
        /// MIME type of the payload (for example `image/png`).
        mime_type: String,
        /// Raw payload bytes.
        data: Bytes,
    },
}

/// Request content accepted by the upstream API.
#[derive(Debug, Clone)]
pub enum GenerateContent {
    /// Single plain-text prompt.
    Text(String),
    /// Structured multimodal parts, sent as one user turn.
    Multimodal(Vec<ContentPart>),
}

impl GenerateContent {
    /// Approximate size of the request content in bytes, for logging.
    pub fn approximate_len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Multimodal(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => text.len(),
                    ContentPart::InlineData { data, .. } => data.len(),
                })
                .sum(),
        }
    }
}

/// Optional generation parameters forwarded to the upstream API.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens.
    pub max_output_tokens: Option<u32>,
}

/// Successful upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    /// Generated text (concatenated text parts of the first candidate).
    pub text: String,
    /// Finish reason reported by the upstream, when present.
    pub finish_reason: Option<String>,
}

impl UpstreamResponse {
    /// Build a response carrying only text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
        }
    }
}
