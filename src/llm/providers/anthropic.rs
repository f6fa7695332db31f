use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ProviderEntry;
use crate::errors::{DeskPilotError, DeskPilotResult, ModelErrorKind};
use crate::llm::provider::ModelClient;
use crate::llm::tools::{computer_tool, system_prompt, COMPUTER_TOOL_NAME};
use crate::llm::types::{ModelRequest, ModelResponse, ResponseBlock};

const API_VERSION: &str = "2023-06-01";
const COMPUTER_USE_BETA: &str = "computer-use-2024-10-22";
const OMITTED_IMAGE: &str = "<omitted_base64_image>";

/// Messages API client with the computer-use tool declared.
pub struct AnthropicProvider {
    id: String,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(id: String, entry: &ProviderEntry, api_key: String) -> Self {
        Self {
            id,
            api_base: entry.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: entry.model.clone(),
            max_tokens: entry.max_tokens,
            temperature: entry.temperature,
            client: reqwest::Client::new(),
        }
    }

    fn build_body(&self, request: &ModelRequest) -> DeskPilotResult<Value> {
        Ok(serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": system_prompt(),
            "tools": [computer_tool(&request.display)],
            "messages": serde_json::to_value(&request.turns)?,
        }))
    }
}

#[async_trait]
impl ModelClient for AnthropicProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn send(&self, request: &ModelRequest) -> DeskPilotResult<ModelResponse> {
        let body = self.build_body(request)?;

        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            turns = request.turns.len(),
            images = request.image_count(),
            "sending model request"
        );
        tracing::trace!(body = %sanitized(&body), "request body (base64 omitted)");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("anthropic-beta", COMPUTER_USE_BETA)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeskPilotError::model(ModelErrorKind::Other, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeskPilotError::model(ModelErrorKind::Other, e.to_string()))?;

        if !status.is_success() {
            let err = classify_failure(status.as_u16(), &text);
            tracing::warn!(status = status.as_u16(), error = %err, "model call rejected");
            return Err(err);
        }

        let parsed = parse_response(&text)?;
        tracing::info!(
            blocks = parsed.blocks.len(),
            structured = parsed.is_structured(),
            stop_reason = ?parsed.stop_reason,
            "model response received"
        );
        Ok(parsed)
    }
}

/// Copy of `body` with every image payload replaced, for logging.
fn sanitized(body: &Value) -> String {
    let mut body = body.clone();
    if let Some(turns) = body.get_mut("messages").and_then(Value::as_array_mut) {
        for turn in turns {
            let Some(blocks) = turn.get_mut("content").and_then(Value::as_array_mut) else {
                continue;
            };
            for block in blocks {
                if let Some(data) = block.get_mut("source").and_then(|s| s.get_mut("data")) {
                    *data = Value::String(OMITTED_IMAGE.to_string());
                }
            }
        }
    }
    body.to_string()
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Maps a failed HTTP exchange to a classified model-call error.
pub fn classify_failure(status: u16, body: &str) -> DeskPilotError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    let kind = match (status, detail.as_ref().map(|d| d.kind.as_str())) {
        (429, _) | (_, Some("rate_limit_error")) | (_, Some("overloaded_error")) => {
            ModelErrorKind::RateLimited
        }
        _ => ModelErrorKind::Other,
    };
    let message = match detail {
        Some(d) => format!("{status} {}: {}", d.kind, d.message),
        None => format!("{status}: {body}"),
    };
    DeskPilotError::model(kind, message)
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<WireBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unsupported,
}

/// Parses a successful Messages API body. A refusal stop reason is a safety rejection.
pub fn parse_response(body: &str) -> DeskPilotResult<ModelResponse> {
    let wire: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| DeskPilotError::model(ModelErrorKind::Other, format!("bad response body: {e}")))?;

    if wire.stop_reason.as_deref() == Some("refusal") {
        return Err(DeskPilotError::model(
            ModelErrorKind::SafetyRejection,
            "model refused the request",
        ));
    }

    let blocks = wire
        .content
        .into_iter()
        .filter_map(|block| match block {
            WireBlock::Text { text } => Some(ResponseBlock::Text { text }),
            WireBlock::ToolUse { name, input } => {
                let action = if name == COMPUTER_TOOL_NAME {
                    input
                        .get("action")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                } else {
                    name
                };
                Some(ResponseBlock::Action {
                    name: action,
                    params: input,
                })
            }
            WireBlock::Unsupported => None,
        })
        .collect();

    Ok(ModelResponse {
        blocks,
        stop_reason: wire.stop_reason,
    })
}
