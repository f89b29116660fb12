//! Sequential extraction over the items of one session.

use crate::{
    config::Config,
    metrics::PipelineMetrics,
    pipeline::{
        combine::{OutcomeMessage, combine_results},
        confidence::heuristic_confidence,
        pdf::{PdfTextExtractor, format_pages},
        types::{Classification, ExtractionMethod, ItemResult, PdfTextError, PipelineOutcome},
    },
    session::{ContentKind, SessionStore, StoredItem},
    upstream::{ContentPart, FailoverRouter, GenerateContent, GenerateOptions, UpstreamError},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

const VISION_PROMPT: &str = "Extract all readable text from this image. Do not summarize or interpret. Return only the plain text you can see, preserving the original formatting and line breaks as much as possible.";

const HANDWRITING_HINT: &str = "The text is handwritten. Read it carefully, keep the writer's own spelling, and mark words you cannot read as [illegible].";

/// Tunables for [`ExtractionPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Model used for vision extraction.
    pub ocr_model: String,
    /// Upper bound on a single item; hitting it cancels the item.
    pub item_timeout: Duration,
    /// Pages read from a PDF text layer.
    pub max_pdf_pages: usize,
}

impl PipelineSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            ocr_model: config.ocr_model.clone(),
            item_timeout: config.ocr_item_timeout,
            max_pdf_pages: config.max_pdf_pages,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::with_defaults())
    }
}

#[derive(Debug, Error)]
enum ItemError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Pdf(#[from] PdfTextError),
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Unsupported content type: {0}")]
    Unsupported(ContentKind),
    #[error("PDF worker failed: {0}")]
    Worker(String),
}

/// Turns the stored items of a session into one combined text.
///
/// Items are processed strictly one after another in stored order; item N+1 never starts before
/// item N's result is recorded. Every failure is folded into the returned outcome.
pub struct ExtractionPipeline {
    store: Arc<SessionStore>,
    router: Arc<FailoverRouter>,
    pdf: Arc<dyn PdfTextExtractor>,
    metrics: Arc<PipelineMetrics>,
    settings: PipelineSettings,
}

impl ExtractionPipeline {
    /// Wire the pipeline to its collaborators.
    pub fn new(
        store: Arc<SessionStore>,
        router: Arc<FailoverRouter>,
        pdf: Arc<dyn PdfTextExtractor>,
        metrics: Arc<PipelineMetrics>,
        settings: PipelineSettings,
    ) -> Self {
        tracing::info!(model = %settings.ocr_model, "Extraction pipeline initialized");
        Self {
            store,
            router,
            pdf,
            metrics,
            settings,
        }
    }

    /// Process every item of `session_id`. Never fails; missing sessions yield a failed outcome.
    pub async fn process(&self, session_id: &str, handwritten: bool) -> PipelineOutcome {
        let started = Instant::now();
        let items = self.store.get_items(session_id);

        if items.is_empty() {
            tracing::warn!(session_id, "No items found for session");
            self.metrics.record_missing_session();
            let message = OutcomeMessage::session_not_found();
            return PipelineOutcome {
                success: false,
                classification: Classification::Failure,
                message: message.message,
                suggestions: message.suggestions,
                error_details: Some(message.title.to_string()),
                session_id: session_id.to_string(),
                total_files_processed: 0,
                combined_text: String::new(),
                items: Vec::new(),
                total_duration_seconds: started.elapsed().as_secs_f64(),
            };
        }

        let total = items.len();
        tracing::info!(session_id, total, handwritten, "Starting extraction");

        let mut results = Vec::with_capacity(total);
        for (index, item) in items.iter().enumerate() {
            let result = self.process_item(item, handwritten).await;
            tracing::info!(
                session_id,
                index = index + 1,
                total,
                filename = %result.filename,
                confidence = result.confidence,
                failed = result.error_message.is_some(),
                "Item processed"
            );
            results.push(result);
        }

        let successful = results.iter().filter(|item| item.is_successful()).count();
        let classification = Classification::from_counts(successful, total);
        let combined_text = if classification.is_success() {
            combine_results(&results)
        } else {
            String::new()
        };
        let error_details = (!classification.is_success()).then(|| summarize_errors(&results));

        self.metrics.record_run(
            classification,
            successful as u64,
            (total - successful) as u64,
        );
        let message =
            OutcomeMessage::for_run(classification, successful, total, combined_text.len());
        tracing::info!(
            session_id,
            successful,
            total,
            classification = ?classification,
            "Extraction finished"
        );

        PipelineOutcome {
            success: classification.is_success(),
            classification,
            message: message.message,
            suggestions: message.suggestions,
            error_details,
            session_id: session_id.to_string(),
            total_files_processed: total,
            combined_text,
            items: results,
            total_duration_seconds: started.elapsed().as_secs_f64(),
        }
    }

    async fn process_item(&self, item: &StoredItem, handwritten: bool) -> ItemResult {
        let started = Instant::now();
        let method = select_method(item);

        let outcome = match tokio::time::timeout(
            self.settings.item_timeout,
            self.extract(item, method, handwritten),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ItemError::TimedOut(self.settings.item_timeout)),
        };

        let (extracted_text, confidence, error_message) = match outcome {
            Ok((text, confidence)) => (text, confidence, None),
            Err(error) => {
                tracing::warn!(filename = %item.filename, error = %error, "Item extraction failed");
                (String::new(), 0.0, Some(error.to_string()))
            }
        };

        ItemResult {
            filename: item.filename.clone(),
            content_kind: item.content_kind.clone(),
            method,
            extracted_text,
            confidence,
            processing_duration_seconds: started.elapsed().as_secs_f64(),
            page_number: item.page_number,
            error_message,
        }
    }

    async fn extract(
        &self,
        item: &StoredItem,
        method: ExtractionMethod,
        handwritten: bool,
    ) -> Result<(String, f32), ItemError> {
        match method {
            ExtractionMethod::TextHint => {
                Ok((text_hint(item).unwrap_or_default().to_string(), 1.0))
            }
            ExtractionMethod::PdfTextLayer => {
                let text = self.read_text_layer(item).await?;
                Ok((text, 1.0))
            }
            ExtractionMethod::Vision => {
                let content = vision_request(item, handwritten);
                let response = self
                    .router
                    .generate(&self.settings.ocr_model, &content, &GenerateOptions::default())
                    .await?;
                let confidence = heuristic_confidence(&response.text);
                tracing::debug!(
                    filename = %item.filename,
                    chars = response.text.len(),
                    confidence,
                    "Vision extraction finished"
                );
                Ok((response.text, confidence))
            }
            ExtractionMethod::Unsupported => Err(ItemError::Unsupported(item.content_kind.clone())),
        }
    }

    async fn read_text_layer(&self, item: &StoredItem) -> Result<String, ItemError> {
        let pdf = self.pdf.clone();
        let payload = item.payload.clone();
        let max_pages = self.settings.max_pdf_pages;

        let pages = tokio::task::spawn_blocking(move || pdf.extract_pages(&payload, max_pages))
            .await
            .map_err(|error| ItemError::Worker(error.to_string()))??;
        Ok(format_pages(&pages))
    }
}

/// The stored hint, unless it is blank.
fn text_hint(item: &StoredItem) -> Option<&str> {
    item.extracted_text_hint
        .as_deref()
        .filter(|hint| !hint.trim().is_empty())
}

fn select_method(item: &StoredItem) -> ExtractionMethod {
    match item.content_kind {
        ContentKind::PdfText if text_hint(item).is_some() => ExtractionMethod::TextHint,
        ContentKind::PdfText => ExtractionMethod::PdfTextLayer,
        ContentKind::Image | ContentKind::PdfImagePage => ExtractionMethod::Vision,
        ContentKind::Other(_) => ExtractionMethod::Unsupported,
    }
}

fn vision_request(item: &StoredItem, handwritten: bool) -> GenerateContent {
    let mut prompt = VISION_PROMPT.to_string();
    if handwritten {
        prompt.push(' ');
        prompt.push_str(HANDWRITING_HINT);
    }
    if let (ContentKind::PdfImagePage, Some(page)) = (&item.content_kind, item.page_number) {
        prompt.push_str(&format!(
            " The attachment is a PDF document; read only page {page}."
        ));
    }

    GenerateContent::Multimodal(vec![
        ContentPart::Text(prompt),
        ContentPart::InlineData {
            mime_type: item.mime_type.clone(),
            data: item.payload.clone(),
        },
    ])
}

fn summarize_errors(results: &[ItemResult]) -> String {
    results
        .iter()
        .map(|item| match &item.error_message {
            Some(error) => format!("{}: {error}", item.filename),
            None => format!("{}: no readable text", item.filename),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
