#![deny(missing_docs)]

//! Core library for the inkread extraction service.

/// HTTP routing and REST handlers.
pub mod api;
/// Injectable time source.
pub mod clock;
/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Extraction run counters.
pub mod metrics;
/// Per-item extraction, confidence scoring and result aggregation.
pub mod pipeline;
/// Service facade consumed by the HTTP surface.
pub mod service;
/// In-memory session storage with time-based expiry.
pub mod session;
/// Summaries, translations and question answering over extracted text.
pub mod transforms;
/// Upload validation and session intake.
pub mod upload;
/// Generative API clients and the credential failover router.
pub mod upstream;
