//! Gemini `generateContent` client with File Search grounding.

use std::collections::BTreeSet;
use std::time::Duration;

use propbot_core::config::GeminiConfig;
use propbot_core::{EventFailure, QueryResult};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

/// Prompt used when the grounded call fails and we retry without the tool.
const FALLBACK_PROMPT: &str = "Answer the following question as if you had just searched an \
internal proposal document store. If you have no real grounding for a claim, say so explicitly \
instead of inventing a citation.\n\nQuestion: ";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("gemini transport failure: {0}")]
    Transport(String),
    #[error("gemini returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("gemini response carried no candidates")]
    EmptyResponse,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingChunk {
    retrieved_context: Option<RetrievedContext>,
}

#[derive(Debug, Deserialize)]
struct RetrievedContext {
    title: Option<String>,
}

pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, GeminiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| GeminiError::Transport(error.to_string()))?;

        Ok(Self { http, config })
    }

    /// Ask the grounded store a question. Never errors: a failed grounded
    /// call falls back to an ungrounded prompt, and a failure of that too
    /// degrades to a user-facing error string with no sources.
    pub async fn query(&self, question: &str) -> QueryResult {
        match self.generate(grounded_request(question, &self.config.store_name)).await {
            Ok(response) => match into_query_result(response) {
                Ok(result) => result,
                Err(extract_error) => self.fallback(question, extract_error).await,
            },
            Err(call_error) => self.fallback(question, call_error).await,
        }
    }

    async fn fallback(&self, question: &str, cause: GeminiError) -> QueryResult {
        warn!(
            event_name = "agent.gemini.grounded_call_failed",
            error = %cause,
            "grounded call failed; retrying without the file search tool"
        );

        let prompt = format!("{FALLBACK_PROMPT}{question}");
        match self.generate(ungrounded_request(&prompt)).await {
            Ok(response) => match into_query_result(response) {
                // No citations exist on this path regardless of what the
                // model claims, so the source list stays empty.
                Ok(result) => QueryResult::ungrounded(result.answer),
                Err(extract_error) => error_result(&extract_error),
            },
            Err(fallback_error) => error_result(&fallback_error),
        }
    }

    async fn generate(&self, body: Value) -> Result<GenerateContentResponse, GeminiError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|error| GeminiError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api { status: status.as_u16(), body });
        }

        let parsed = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|error| GeminiError::Transport(error.to_string()))?;

        info!(
            event_name = "agent.gemini.generate_content",
            model = %self.config.model,
            candidate_count = parsed.candidates.len(),
            "generateContent call completed"
        );
        Ok(parsed)
    }
}

fn grounded_request(question: &str, store_name: &str) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": question }] }],
        "tools": [{ "file_search": { "file_search_store_names": [store_name] } }],
    })
}

fn ungrounded_request(prompt: &str) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
    })
}

fn error_result(cause: &GeminiError) -> QueryResult {
    QueryResult::ungrounded(EventFailure::Backend(cause.to_string()).user_message())
}

fn into_query_result(response: GenerateContentResponse) -> Result<QueryResult, GeminiError> {
    let candidate = response.candidates.into_iter().next().ok_or(GeminiError::EmptyResponse)?;

    let answer = candidate
        .content
        .map(|content| {
            content.parts.into_iter().filter_map(|part| part.text).collect::<Vec<_>>().join("")
        })
        .filter(|text| !text.is_empty())
        .ok_or(GeminiError::EmptyResponse)?;

    // Titles land in a BTreeSet: deduplicated, and rendered in a stable
    // sorted order rather than the backend's arbitrary chunk order.
    let sources: BTreeSet<String> = candidate
        .grounding_metadata
        .map(|metadata| {
            metadata
                .grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.retrieved_context)
                .map(|context| context.title.unwrap_or_else(|| "Unknown".to_string()))
                .collect()
        })
        .unwrap_or_default();

    Ok(QueryResult { answer, sources: sources.into_iter().collect() })
}
