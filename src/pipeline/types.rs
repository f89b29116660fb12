//! Result types and error definitions for the extraction pipeline.

use crate::session::ContentKind;
use serde::Serialize;
use thiserror::Error;

/// Success ratio at or above which a run counts as a full success.
pub const FULL_SUCCESS_RATIO: f64 = 0.8;

/// Errors raised by the PDF text collaborator.
#[derive(Debug, Error)]
pub enum PdfTextError {
    /// The payload could not be parsed as a PDF.
    #[error("could not open PDF: {0}")]
    Load(String),
}

/// Overall outcome of a pipeline run, derived from the item success ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// At least 80% of the items produced text.
    FullSuccess,
    /// Some, but fewer than 80%, of the items produced text.
    PartialSuccess,
    /// No item produced text, or the session was missing.
    Failure,
}

impl Classification {
    /// Classify a run from the number of successful items out of `total`.
    pub fn from_counts(successful: usize, total: usize) -> Self {
        if total == 0 || successful == 0 {
            return Self::Failure;
        }
        let ratio = successful as f64 / total as f64;
        if ratio >= FULL_SUCCESS_RATIO {
            Self::FullSuccess
        } else {
            Self::PartialSuccess
        }
    }

    /// Whether the run should be reported as usable.
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Failure)
    }
}

/// Strategy used to obtain an item's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Text supplied by the uploader was used as-is.
    TextHint,
    /// Text was read from the PDF text layer.
    PdfTextLayer,
    /// Text was read by the upstream vision model.
    Vision,
    /// The content kind is not handled.
    Unsupported,
}

/// Per-item extraction result. Exactly one is produced per stored item, in stored order.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    /// File name of the source item.
    pub filename: String,
    /// Content kind of the source item.
    pub content_kind: ContentKind,
    /// Strategy that produced the text.
    pub method: ExtractionMethod,
    /// Extracted text; empty on failure.
    pub extracted_text: String,
    /// Heuristic confidence in `[0, 1]`.
    pub confidence: f32,
    /// Wall time spent on the item.
    pub processing_duration_seconds: f64,
    /// 1-based page number for PDF page items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// Failure description, if the item could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ItemResult {
    /// An item counts as successful when it produced non-empty text and no error.
    pub fn is_successful(&self) -> bool {
        self.error_message.is_none() && !self.extracted_text.trim().is_empty()
    }
}

/// Aggregated result of processing one session.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// Whether the combined text is usable.
    pub success: bool,
    /// Success-ratio classification.
    pub classification: Classification,
    /// Human-readable summary.
    pub message: String,
    /// Follow-up hints for the user.
    pub suggestions: Vec<String>,
    /// Extra failure context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    /// Session that was processed.
    pub session_id: String,
    /// Number of items processed.
    pub total_files_processed: usize,
    /// Text of every item, in order, with separators and placeholders.
    pub combined_text: String,
    /// Per-item results in stored order.
    pub items: Vec<ItemResult>,
    /// Wall time for the whole run.
    pub total_duration_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_thresholds() {
        assert_eq!(Classification::from_counts(5, 5), Classification::FullSuccess);
        assert_eq!(Classification::from_counts(4, 5), Classification::FullSuccess);
        assert_eq!(Classification::from_counts(3, 5), Classification::PartialSuccess);
        assert_eq!(Classification::from_counts(1, 2), Classification::PartialSuccess);
        assert_eq!(Classification::from_counts(0, 3), Classification::Failure);
        assert_eq!(Classification::from_counts(0, 0), Classification::Failure);
    }

    #[test]
    fn classification_serializes_upper_case() {
        let json = serde_json::to_string(&Classification::PartialSuccess).expect("serialize");
        assert_eq!(json, r#""PARTIAL_SUCCESS""#);
    }

    #[test]
    fn errored_items_are_not_successful() {
        let item = ItemResult {
            filename: "a.png".into(),
            content_kind: ContentKind::Image,
            method: ExtractionMethod::Vision,
            extracted_text: "text".into(),
            confidence: 0.5,
            processing_duration_seconds: 0.0,
            page_number: None,
            error_message: Some("boom".into()),
        };
        assert!(!item.is_successful());
    }
}
