//! Single-credential client for the Gemini `generateContent` endpoint.
//!
//! A [`GenerativeClient`] wraps exactly one credential and has no state beyond it. Failover
//! between credentials lives in [`crate::upstream::FailoverRouter`].

use crate::upstream::types::{
    ClientError, ContentPart, GenerateContent, GenerateOptions, UpstreamResponse,
};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Interface implemented by credentialed upstream clients.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Generate content with the given model.
    async fn generate(
        &self,
        model: &str,
        content: &GenerateContent,
        options: &GenerateOptions,
    ) -> Result<UpstreamResponse, ClientError>;
}

/// HTTP client bound to a single Gemini API key.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    /// Construct a client for `api_key` against `base_url`.
    pub fn new(base_url: &str, api_key: String) -> Result<Self, ClientError> {
        let http = Client::builder().user_agent("inkread/0.1").build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.trim().trim_start_matches("models/");
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(default, rename = "blockReason")]
    block_reason: Option<String>,
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        content: &GenerateContent,
        options: &GenerateOptions,
    ) -> Result<UpstreamResponse, ClientError> {
        let body = build_request_body(content, options);

        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus { status, body });
        }

        let payload: GenerateContentResponse = response.json().await.map_err(|error| {
            ClientError::InvalidResponse(format!("failed to decode response: {error}"))
        })?;

        parse_response(payload)
    }
}

/// Build the JSON request body for `generateContent`.
pub(crate) fn build_request_body(content: &GenerateContent, options: &GenerateOptions) -> Value {
    let parts: Vec<Value> = match content {
        GenerateContent::Text(text) => vec![json!({ "text": text })],
        GenerateContent::Multimodal(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => json!({ "text": text }),
                ContentPart::InlineData { mime_type, data } => json!({
                    "inline_data": {
                        "mime_type": mime_type,
                        "data": BASE64.encode(data),
                    }
                }),
            })
            .collect(),
    };

    let mut body = Map::new();
    body.insert(
        "contents".into(),
        json!([{ "role": "user", "parts": parts }]),
    );

    let mut generation_config = Map::new();
    if let Some(temperature) = options.temperature {
        generation_config.insert("temperature".into(), Value::from(temperature));
    }
    if let Some(max_tokens) = options.max_output_tokens {
        generation_config.insert("maxOutputTokens".into(), Value::from(max_tokens));
    }
    if !generation_config.is_empty() {
        body.insert("generationConfig".into(), Value::Object(generation_config));
    }

    Value::Object(body)
}

fn parse_response(payload: GenerateContentResponse) -> Result<UpstreamResponse, ClientError> {
    let Some(candidate) = payload.candidates.into_iter().next() else {
        let reason = payload
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(ClientError::InvalidResponse(format!(
            "response contained no text: {reason}"
        )));
    };

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(UpstreamResponse {
        text,
        finish_reason: candidate.finish_reason,
    })
}
