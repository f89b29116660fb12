//! Multi-document extraction: strategy selection, sequential processing, and result assembly.

pub mod combine;
pub mod confidence;
pub mod pdf;
pub mod service;
pub mod types;

pub use combine::{OutcomeMessage, combine_results};
pub use confidence::heuristic_confidence;
pub use pdf::{LopdfTextExtractor, PdfPage, PdfTextExtractor, format_pages, looks_like_text};
pub use service::{ExtractionPipeline, PipelineSettings};
pub use types::{
    Classification, ExtractionMethod, FULL_SUCCESS_RATIO, ItemResult, PdfTextError,
    PipelineOutcome,
};
