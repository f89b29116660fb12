//! Follow-on text transforms (summarize, translate, answer) over the failover router.

use crate::{
    config::Config,
    upstream::{FailoverRouter, GenerateContent, GenerateOptions, UpstreamError},
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

const PROBE_PROMPT: &str =
    "Say 'Hello from inkread!' in a friendly way for students.";

/// Errors emitted by the transforms.
#[derive(Debug, Error)]
pub enum TransformError {
    /// No source text was supplied.
    #[error("There is no text to work with. Extract text from your files first.")]
    EmptyText,
    /// A required field other than the text was blank.
    #[error("The '{0}' field must not be empty.")]
    EmptyField(&'static str),
    /// The upstream call failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Model identifiers used per transform.
#[derive(Debug, Clone)]
pub struct TransformModels {
    /// Model for summaries.
    pub summarize: String,
    /// Model for translations.
    pub translate: String,
    /// Model for question answering.
    pub qa: String,
}

impl TransformModels {
    /// Models from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            summarize: config.summarize_model.clone(),
            translate: config.translate_model.clone(),
            qa: config.qa_model.clone(),
        }
    }
}

/// Grade-level summary.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    /// Summary text.
    pub summary: String,
    /// Grade level the summary targets.
    pub grade_level: String,
    /// Characters in the source text.
    pub original_length: usize,
    /// Characters in the summary.
    pub summary_length: usize,
}

/// Translation into a target language.
#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    /// Translated text.
    pub translation: String,
    /// Requested language.
    pub target_language: String,
    /// Characters in the source text.
    pub original_length: usize,
    /// Characters in the translation.
    pub translation_length: usize,
}

/// Answer to a question about a text.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Answer text.
    pub answer: String,
    /// Question that was asked.
    pub question: String,
    /// Characters in the source text.
    pub content_length: usize,
}

/// Prompt templates bound to the failover router.
pub struct TextTransforms {
    router: Arc<FailoverRouter>,
    models: TransformModels,
}

impl TextTransforms {
    /// Bind the transforms to `router`.
    pub fn new(router: Arc<FailoverRouter>, models: TransformModels) -> Self {
        Self { router, models }
    }

    /// Summarize `text` for a student in `grade_level`.
    pub async fn summarize(&self, text: &str, grade_level: &str) -> Result<Summary, TransformError> {
        let text = require_text(text)?;
        let grade_level = match grade_level.trim() {
            "" => "7",
            grade => grade,
        };
        tracing::info!(grade_level, chars = text.len(), "Summarizing text");

        let prompt = summarize_prompt(text, grade_level);
        let summary = self.run(&self.models.summarize, prompt).await?;
        Ok(Summary {
            summary_length: summary.len(),
            summary,
            grade_level: grade_level.to_string(),
            original_length: text.len(),
        })
    }

    /// Translate `text` into `target_language`.
    pub async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<Translation, TransformError> {
        let text = require_text(text)?;
        let target_language = require_field(target_language, "target_language")?;
        tracing::info!(target_language, chars = text.len(), "Translating text");

        let prompt = translate_prompt(text, target_language);
        let translation = self.run(&self.models.translate, prompt).await?;
        Ok(Translation {
            translation_length: translation.len(),
            translation,
            target_language: target_language.to_string(),
            original_length: text.len(),
        })
    }

    /// Answer `question` using `text` as context.
    pub async fn answer(&self, text: &str, question: &str) -> Result<Answer, TransformError> {
        let text = require_text(text)?;
        let question = require_field(question, "question")?;
        tracing::info!(chars = text.len(), "Answering question");

        let prompt = answer_prompt(text, question);
        let answer = self.run(&self.models.qa, prompt).await?;
        Ok(Answer {
            answer,
            question: question.to_string(),
            content_length: text.len(),
        })
    }

    /// Send a fixed greeting prompt to check that a credential works end to end.
    pub async fn probe(&self) -> Result<String, UpstreamError> {
        let response = self
            .router
            .generate(
                &self.models.summarize,
                &GenerateContent::Text(PROBE_PROMPT.to_string()),
                &GenerateOptions::default(),
            )
            .await?;
        Ok(response.text.trim().to_string())
    }

    async fn run(&self, model: &str, prompt: String) -> Result<String, TransformError> {
        let response = self
            .router
            .generate(model, &GenerateContent::Text(prompt), &GenerateOptions::default())
            .await?;
        Ok(response.text.trim().to_string())
    }
}

fn require_text(text: &str) -> Result<&str, TransformError> {
    match text.trim() {
        "" => Err(TransformError::EmptyText),
        _ => Ok(text),
    }
}

fn require_field<'a>(value: &'a str, field: &'static str) -> Result<&'a str, TransformError> {
    match value.trim() {
        "" => Err(TransformError::EmptyField(field)),
        trimmed => Ok(trimmed),
    }
}

fn summarize_prompt(text: &str, grade_level: &str) -> String {
    let audience = match grade_level.parse::<u32>() {
        Ok(grade) => format!("a grade {grade} student (age {}-{})", grade + 5, grade + 6),
        Err(_) => format!("a {grade_level} student"),
    };
    format!(
        "Please create a summary of the following text that is appropriate for {audience}.\n\n\
         Guidelines:\n\
         - Use simple, clear language appropriate for the grade level\n\
         - Keep sentences short and easy to understand\n\
         - Focus on the main ideas and key points\n\
         - Make it engaging and helpful for homework\n\
         - Use encouraging, positive tone\n\
         - Aim for 3-5 key points maximum\n\n\
         Text to summarize:\n{text}\n\n\
         Please provide a clear, student-friendly summary:"
    )
}

fn translate_prompt(text: &str, target_language: &str) -> String {
    format!(
        "Please translate the following text to {target_language}.\n\n\
         Guidelines:\n\
         - Provide accurate, natural translation\n\
         - Maintain the original meaning and context\n\
         - Use appropriate formality level for students\n\
         - If the text contains educational content, preserve the learning value\n\
         - If translation is not possible, explain why in a student-friendly way\n\n\
         Text to translate:\n{text}\n\n\
         Please provide the translation in {target_language}:"
    )
}

fn answer_prompt(text: &str, question: &str) -> String {
    format!(
        "You are a helpful educational assistant for students. Based on the following content, \
         please answer the student's question.\n\n\
         Guidelines:\n\
         - Provide clear, accurate answers appropriate for students\n\
         - Use simple, encouraging language\n\
         - If the answer isn't in the content, say so politely\n\
         - Give helpful explanations that aid learning\n\
         - If the question is unclear, ask for clarification\n\n\
         Content:\n{text}\n\n\
         Student's Question: {question}\n\n\
         Please provide a helpful answer:"
    )
}
