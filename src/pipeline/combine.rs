//! Combined text assembly and user-facing outcome messages.

use crate::pipeline::types::{Classification, ItemResult};

/// Join item texts in order. Items after the first get a header naming the file; items without
/// text get a placeholder so every input is accounted for.
pub fn combine_results(items: &[ItemResult]) -> String {
    let mut parts = Vec::with_capacity(items.len() * 2);

    for (index, item) in items.iter().enumerate() {
        let text = item.extracted_text.trim();
        if !text.is_empty() {
            if index > 0 {
                parts.push(section_header(item));
            }
            parts.push(text.to_string());
            continue;
        }

        let placeholder = match &item.error_message {
            Some(reason) => format!("[Could not read this file: {reason}]"),
            None => "[No readable text found in this file]".to_string(),
        };
        parts.push(format!("\n\n=== {} ===\n{placeholder}", item.filename));
    }

    parts.join("\n").trim().to_string()
}

fn section_header(item: &ItemResult) -> String {
    match item.page_number {
        Some(page) => format!("\n\n=== {} (Page {page}) ===\n", item.filename),
        None => format!("\n\n=== {} ===\n", item.filename),
    }
}

/// Message and follow-up hints attached to an outcome.
#[derive(Debug, Clone)]
pub struct OutcomeMessage {
    /// Short headline.
    pub title: &'static str,
    /// Human-readable summary.
    pub message: String,
    /// Follow-up hints.
    pub suggestions: Vec<String>,
}

impl OutcomeMessage {
    fn new(title: &'static str, message: String, suggestions: &[&str]) -> Self {
        Self {
            title,
            message,
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Message for a run classified as `classification`.
    pub fn for_run(
        classification: Classification,
        successful: usize,
        total: usize,
        text_length: usize,
    ) -> Self {
        match classification {
            Classification::FullSuccess => Self::new(
                "Text extracted",
                format!("I successfully read {total} file(s) and found {text_length} characters of text!"),
                &[
                    "Now you can ask me questions about this content",
                    "I can also summarize this for your grade level",
                    "Or translate it to another language if you need!",
                ],
            ),
            Classification::PartialSuccess => Self::new(
                "Some files could not be read",
                format!("I successfully read {successful} out of {total} files."),
                &[
                    "Some files might have been unclear or damaged",
                    "The text I found is still useful for your homework",
                    "Try uploading clearer images if you need better results",
                ],
            ),
            Classification::Failure => Self::new(
                "No text extracted",
                "I couldn't extract text from your files. This might be because the images are unclear or the text is too small.".to_string(),
                &[
                    "Try taking clearer, brighter photos",
                    "Make sure the text is large enough to read",
                    "Check that your images aren't blurry or rotated",
                ],
            ),
        }
    }

    /// Message for a session that does not exist or has expired.
    pub fn session_not_found() -> Self {
        Self::new(
            "Session not found",
            "It looks like your files weren't uploaded properly or the session expired.".to_string(),
            &[
                "Please upload your files again",
                "Make sure you click 'Upload' before trying to extract text",
                "Try refreshing the page if this keeps happening",
            ],
        )
    }
}
