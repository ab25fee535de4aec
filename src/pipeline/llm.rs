//! Vision-model interaction: build the chat request and call the provider.
//!
//! The request is a single user message whose content is the instruction
//! text followed by one attachment per page. All prompt wording lives in
//! [`crate::prompts`]; this module only deals with transport, error mapping
//! and normalising the reply.
//!
//! There are no retries. A failed call is surfaced once, with the message
//! the provider gave when it gave one.

use crate::config::ModelConfig;
use crate::error::{truncate_chars, MathGenError};
use crate::pipeline::encode::{data_url, PageImage};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Characters of a non-JSON error body quoted in the error message.
const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// One attachment sent alongside the instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// A page image (rendered page or uploaded photo).
    Image(PageImage),
    /// The original PDF, used when rasterisation is unavailable.
    Pdf {
        file_name: String,
        /// Base64 payload, no data-URL prefix.
        data: String,
    },
}

/// Everything the model needs for one generation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub instruction: String,
    pub attachments: Vec<Attachment>,
}

/// The model's answer, normalised to one text value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub finish_reason: Option<String>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

impl ModelReply {
    /// The model stopped because it hit the token limit.
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// A vision-capable language model.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<ModelReply, MathGenError>;
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Value,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

// ── OpenRouter client ────────────────────────────────────────────────────────

/// OpenAI-compatible chat-completions client (OpenRouter by default).
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    config: ModelConfig,
}

impl OpenRouterClient {
    pub fn new(config: ModelConfig) -> Result<Self, MathGenError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| MathGenError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn map_transport_error(&self, e: reqwest::Error) -> MathGenError {
        if e.is_timeout() {
            MathGenError::ModelTimeout {
                secs: self.config.timeout_ms / 1000,
            }
        } else {
            MathGenError::ModelRequestFailed {
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl VisionModel for OpenRouterClient {
    async fn generate(&self, request: GenerationRequest) -> Result<ModelReply, MathGenError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(MathGenError::ModelNotConfigured)?;

        let body = build_request_body(&self.config.model, self.config.max_tokens, &request);
        debug!(
            "Sending {} attachment(s) to {} ({})",
            request.attachments.len(),
            self.config.model,
            self.config.endpoint
        );

        let start = Instant::now();
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.config.http_referer)
            .header("X-Title", &self.config.app_title)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let elapsed = start.elapsed();
        info!("Model replied with status {} in {}ms", status, elapsed.as_millis());
        if elapsed.as_millis() as u64 > self.config.timeout_ms * 8 / 10 {
            warn!(
                "Model call used {}ms of the {}ms bound",
                elapsed.as_millis(),
                self.config.timeout_ms
            );
        }

        if !status.is_success() {
            return Err(MathGenError::ModelApiError {
                status: status.as_u16(),
                message: api_error_message(status, &text),
            });
        }

        parse_reply(&text)
    }
}

/// Chat-completions body: one user message, text first, then attachments.
pub fn build_request_body(model: &str, max_tokens: usize, request: &GenerationRequest) -> Value {
    let mut content = vec![json!({ "type": "text", "text": request.instruction })];
    for attachment in &request.attachments {
        content.push(match attachment {
            Attachment::Image(page) => json!({
                "type": "image_url",
                "image_url": { "url": page.data_url() },
            }),
            Attachment::Pdf { file_name, data } => json!({
                "type": "file",
                "file": {
                    "filename": file_name,
                    "file_data": data_url("application/pdf", data),
                },
            }),
        });
    }

    json!({
        "model": model,
        "messages": [{ "role": "user", "content": content }],
        "max_tokens": max_tokens,
    })
}

/// Parse a 2xx body into a [`ModelReply`].
pub fn parse_reply(body: &str) -> Result<ModelReply, MathGenError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| MathGenError::MalformedModelResponse {
            detail: format!("Failed to parse model response: {}", e),
        })?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| MathGenError::MalformedModelResponse {
            detail: "Model response is missing choices".to_string(),
        })?;

    let text = choice
        .message
        .map(|m| normalize_content(&m.content))
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(MathGenError::MalformedModelResponse {
            detail: "Model response contained no text".to_string(),
        });
    }

    let (prompt_tokens, completion_tokens) = parsed
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((None, None));

    Ok(ModelReply {
        text,
        finish_reason: choice.finish_reason,
        prompt_tokens,
        completion_tokens,
    })
}

/// Flatten message content to text.
///
/// A plain string is used as-is. A list of parts keeps only the text parts,
/// joined with newlines. Anything else is empty.
pub fn normalize_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => {
                    let is_text = obj
                        .get("type")
                        .and_then(Value::as_str)
                        .map_or(true, |t| t == "text");
                    if is_text {
                        obj.get("text").and_then(Value::as_str)
                    } else {
                        None
                    }
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// User-facing message for a non-2xx reply.
///
/// Prefers the provider's own message (`error.message`, `error` as a string,
/// `error.text`, top-level `message`); otherwise names the status and quotes
/// the start of the body.
pub fn api_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        let candidates = [
            v.pointer("/error/message"),
            v.get("error").filter(|e| e.is_string()),
            v.pointer("/error/text"),
            v.get("message"),
        ];
        if let Some(msg) = candidates
            .into_iter()
            .flatten()
            .find_map(|m| m.as_str().filter(|s| !s.trim().is_empty()))
        {
            return msg.to_string();
        }
    }

    let reason = status.canonical_reason().unwrap_or("Unknown");
    let preview = truncate_chars(body.trim(), ERROR_BODY_PREVIEW_CHARS);
    if preview.is_empty() {
        format!("API error ({}): {}", status.as_u16(), reason)
    } else {
        format!("API error ({}): {} - {}", status.as_u16(), reason, preview)
    }
}
