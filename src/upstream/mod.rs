//! Generative-content API access: credentialed clients and the failover router.

pub mod classify;
pub mod client;
pub mod router;
pub mod types;

pub use classify::{classify_client_error, classify_error};
pub use client::{GeminiClient, GenerativeClient};
pub use router::{DEFAULT_FAILBACK_COOLDOWN, FailoverRouter, RequestCounters, RouterStatus};
pub use types::{
    ClientError, ContentPart, CredentialState, ErrorKind, GenerateContent, GenerateOptions, Slot,
    UpstreamError, UpstreamResponse,
};
