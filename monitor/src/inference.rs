//! Inference provider seam and its OpenAI-compatible HTTP client.
//!
//! The provider is a pure data source: document text in, candidate todos out.
//! Failures are classified into the four [`InferenceErrorKind`]s and are never
//! retried here; callers decide how to surface them.
//!
//! # Example
//!
//! ```no_run
//! use notetodo_monitor::config::InferenceConfig;
//! use notetodo_monitor::inference::{HttpInferenceClient, InferenceProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InferenceConfig {
//!         api_key: Some("sk-...".to_string()),
//!         ..InferenceConfig::default()
//!     };
//!     let client = HttpInferenceClient::new(config)?;
//!
//!     for candidate in client.infer("Need to email Sam about the invoice").await? {
//!         println!("{}: {}", candidate.line_number, candidate.text);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::InferenceConfig;
use crate::types::InferredCandidate;

/// Instructions sent ahead of every document.
const SYSTEM_PROMPT: &str = "You find implicit tasks in personal notes. \
The user message is a note with every line prefixed by its 1-based line number and ': '. \
Report actionable tasks that are NOT already written with explicit todo syntax \
(checkboxes such as '- [ ]', or the prefixes TODO:, DONE:, IN PROGRESS:). \
Respond with a single JSON object and nothing else, shaped as \
{\"todos\":[{\"text\":string,\"lineNumber\":integer,\"confidence\":\"high\"|\"medium\"|\"low\",\"reasoning\":string}]}. \
Use an empty list when there are no tasks.";

/// Classified inference failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// Missing or rejected credential.
    #[error("inference provider rejected the credential")]
    Unauthorized,

    /// The provider asked us to slow down.
    #[error("inference provider rate limited the request{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// No answer within the configured bound.
    #[error("inference request timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    /// Transport failure, unexpected status, or malformed payload.
    #[error("inference failed: {0}")]
    Unknown(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(", retry after {secs}s"))
        .unwrap_or_default()
}

/// The class of an [`InferenceError`], without its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InferenceErrorKind {
    Unauthorized,
    RateLimited,
    Timeout,
    Unknown,
}

impl InferenceError {
    #[must_use]
    pub fn kind(&self) -> InferenceErrorKind {
        match self {
            Self::Unauthorized => InferenceErrorKind::Unauthorized,
            Self::RateLimited { .. } => InferenceErrorKind::RateLimited,
            Self::Timeout { .. } => InferenceErrorKind::Timeout,
            Self::Unknown(_) => InferenceErrorKind::Unknown,
        }
    }
}

/// Source of inferred todo candidates.
///
/// An empty list is a successful answer.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn infer(&self, document: &str) -> Result<Vec<InferredCandidate>, InferenceError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Deserialize)]
struct TodoPayload {
    todos: Vec<InferredCandidate>,
}

/// OpenAI-compatible chat-completions client.
pub struct HttpInferenceClient {
    config: InferenceConfig,
    client: Client,
}

impl std::fmt::Debug for HttpInferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpInferenceClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpInferenceClient {
    /// Builds a client whose requests time out after `config.timeout`.
    ///
    /// # Errors
    ///
    /// Returns `InferenceError::Unknown` if the HTTP client cannot be built.
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| InferenceError::Unknown(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn classify_transport_error(&self, e: &reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout {
                after_secs: self.config.timeout.as_secs(),
            }
        } else {
            InferenceError::Unknown(e.to_string())
        }
    }
}

#[async_trait]
impl InferenceProvider for HttpInferenceClient {
    async fn infer(&self, document: &str) -> Result<Vec<InferredCandidate>, InferenceError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            warn!("No inference API key configured");
            return Err(InferenceError::Unauthorized);
        };

        let numbered = number_lines(document);
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &numbered,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let url = self.endpoint();
        debug!(url = %url, model = %self.config.model, bytes = document.len(), "Requesting inference");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(&e))?;

        let status = response.status();
        match status {
            _ if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(status = status.as_u16(), "Inference credential rejected");
                return Err(InferenceError::Unauthorized);
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = parse_retry_after(&response);
                warn!(retry_after_secs = ?retry_after_secs, "Inference rate limited");
                return Err(InferenceError::RateLimited { retry_after_secs });
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), message = %message, "Inference request failed");
                return Err(InferenceError::Unknown(format!(
                    "provider returned {}: {}",
                    status.as_u16(),
                    message
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.classify_transport_error(&e))?;

        let candidates = parse_completion(&body)?;
        debug!(candidates = candidates.len(), "Inference succeeded");
        Ok(candidates)
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Prefixes every line with its 1-based number and `": "`.
#[must_use]
pub fn number_lines(document: &str) -> String {
    document
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{}: {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses a chat-completions response body into candidates.
///
/// The whole payload is rejected if anything is missing or malformed; no
/// partial candidate list is ever returned.
///
/// # Errors
///
/// Returns `InferenceError::Unknown` describing the first problem found.
pub fn parse_completion(body: &str) -> Result<Vec<InferredCandidate>, InferenceError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| InferenceError::Unknown(format!("malformed response body: {e}")))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| InferenceError::Unknown("response has no message content".to_string()))?;

    let payload: TodoPayload = serde_json::from_str(strip_code_fence(&content))
        .map_err(|e| InferenceError::Unknown(format!("malformed todo payload: {e}")))?;

    Ok(payload.todos)
}

/// Removes a surrounding markdown code fence, which some models add anyway.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
