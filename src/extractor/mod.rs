//! Chunk extractor providers.
//!
//! Implementations of [`ChunkExtractor`] selected by `[extractor].provider`:
//!
//! - **[`HeuristicExtractor`]**: deterministic, offline rules. The default,
//!   and what the integration tests run against.
//! - **[`OpenAIExtractor`]**: a JSON chat-completions call to a hosted model.
//! - **[`DisabledExtractor`]**: always fails permanently.
//!
//! # Failure Classification
//!
//! Providers never retry on their own; the processor owns the retry
//! budget. The OpenAI provider classifies failures so the processor knows
//! which ones are worth another attempt:
//! - HTTP 429 (rate limited) and 5xx (server error) → `Transient`
//! - Network errors and timeouts → `Transient`
//! - Other HTTP 4xx → `Permanent`
//! - A response that does not parse as an extraction → `Permanent`

mod heuristic;

pub use heuristic::HeuristicExtractor;

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;

use bundle_harness_core::error::ExtractionError;
use bundle_harness_core::extract::ChunkExtractor;
use bundle_harness_core::models::ExtractionPayload;

use crate::config::ExtractorConfig;

// ============ Disabled Extractor ============

/// An extractor that refuses every call.
///
/// Used when `extractor.provider = "disabled"`: bundles can still be
/// created and searched, but chunk processing fails on the first chunk.
pub struct DisabledExtractor;

#[async_trait]
impl ChunkExtractor for DisabledExtractor {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn extract(&self, _text: &str) -> Result<ExtractionPayload, ExtractionError> {
        Err(ExtractionError::Permanent(
            "extraction is disabled (extractor.provider = \"disabled\")".to_string(),
        ))
    }

    async fn summarize(&self, _text: &str) -> Result<String, ExtractionError> {
        Err(ExtractionError::Permanent(
            "summarization is disabled (extractor.provider = \"disabled\")".to_string(),
        ))
    }
}

// ============ OpenAI Extractor ============

const EXTRACT_PROMPT: &str = "You analyse pages of a legal court bundle. Each page starts with a \
line '--- Page N ---'. Return a JSON object with keys: headings [{title, page}], \
timelineEvents [{date, description, page}], issues [{label, category, page}], \
candidateContradictions [{statementA, pageA, statementB, pageB, reason, confidence}], \
claims [{statement, page}] listing each disputed factual assertion once. \
Use the page numbers from the markers. Dates as written in the text. Return JSON only.";

const SUMMARY_PROMPT: &str = "Summarise this legal court bundle in one paragraph for a lawyer \
preparing for a hearing: the parties, the claim, the key dates, and the main disputed issues.";

/// Extractor backed by an OpenAI-compatible chat-completions endpoint.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAIExtractor {
    /// Create a new OpenAI extractor from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` is not set, if `OPENAI_API_KEY` is not
    /// in the environment, or if the HTTP client cannot be built.
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("extractor.model required for OpenAI provider"))?;

        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(k) if !k.trim().is_empty() => k,
            _ => bail!("OPENAI_API_KEY environment variable not set"),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            url: config.url.clone(),
        })
    }

    /// One chat-completions round trip; returns the assistant message text.
    async fn complete(&self, system: &str, user: &str, json_mode: bool) -> Result<String, ExtractionError> {
        let mut body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        if json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractionError::Transient(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = format!("OpenAI API error {}: {}", status, body_text);
            // Rate limited or server error: worth retrying.
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(ExtractionError::Transient(message));
            }
            return Err(ExtractionError::Permanent(message));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::Transient(format!("OpenAI response read failed: {}", e)))?;
        message_content(&value)
    }
}

#[async_trait]
impl ChunkExtractor for OpenAIExtractor {
    fn name(&self) -> &str {
        "openai"
    }

    async fn extract(&self, text: &str) -> Result<ExtractionPayload, ExtractionError> {
        let content = self.complete(EXTRACT_PROMPT, text, true).await?;
        parse_payload(&content)
    }

    async fn summarize(&self, text: &str) -> Result<String, ExtractionError> {
        let content = self.complete(SUMMARY_PROMPT, text, false).await?;
        let summary = content.trim();
        if summary.is_empty() {
            return Err(ExtractionError::Permanent("OpenAI returned an empty summary".to_string()));
        }
        Ok(summary.to_string())
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response.
fn message_content(value: &serde_json::Value) -> Result<String, ExtractionError> {
    value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ExtractionError::Permanent("Invalid OpenAI response: missing message content".to_string())
        })
}

/// Parse a model's JSON answer, tolerating a fenced code block around it.
fn parse_payload(content: &str) -> Result<ExtractionPayload, ExtractionError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim())
        .map_err(|e| ExtractionError::Permanent(format!("unparsable extraction output: {}", e)))
}

/// Create the [`ChunkExtractor`] named by configuration.
///
/// | Config Value | Extractor |
/// |-------------|-----------|
/// | `"heuristic"` | [`HeuristicExtractor`] |
/// | `"openai"` | [`OpenAIExtractor`] |
/// | `"disabled"` | [`DisabledExtractor`] |
pub fn create_extractor(config: &ExtractorConfig) -> Result<Box<dyn ChunkExtractor>> {
    match config.provider.as_str() {
        "heuristic" => Ok(Box::new(HeuristicExtractor::new())),
        "disabled" => Ok(Box::new(DisabledExtractor)),
        "openai" => Ok(Box::new(OpenAIExtractor::new(config)?)),
        other => bail!("Unknown extractor provider: {}", other),
    }
}
