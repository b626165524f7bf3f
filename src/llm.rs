//! Chat model client.
//!
//! A thin trait over an OpenAI-compatible chat completions endpoint with
//! tool calling. The orchestrator only sees `ChatClient`, so tests drive it
//! with a scripted implementation instead of a network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::OrchestratorError;

/// Default model when LLM_MODEL is not set (Ollama naming; any
/// OpenAI-compatible endpoint works).
const DEFAULT_MODEL: &str = "llama3.1";
const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

/// Upstream request timeout. Generation on local hardware is slow; the
/// per-tool timeout is separate and much tighter.
const MODEL_TIMEOUT_SECS: u64 = 120;

/// One message in the conversation sent to the model, in chat-completions
/// wire shape. `tool_calls` is set on assistant messages requesting tools;
/// `tool_call_id` on the tool-result messages answering them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }

    /// Assistant message carrying tool-call requests, echoed back to the
    /// model so it can pair them with the tool results that follow.
    pub fn assistant_tool_calls(calls: &[ToolCallRequest]) -> Self {
        let wire: Vec<Value> = calls
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "type": "function",
                    "function": {
                        "name": c.name,
                        "arguments": c.arguments.to_string(),
                    },
                })
            })
            .collect();
        Self { role: "assistant".into(), content: None, tool_calls: Some(wire), tool_call_id: None }
    }

    pub fn tool_result(call_id: impl Into<String>, payload: &Value) -> Self {
        Self {
            role: "tool".into(),
            content: Some(payload.to_string()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// One tool invocation requested by the model. `arguments` is already
/// parsed from the wire's JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// What the model did with one round-trip.
#[derive(Debug, Clone)]
pub enum ModelTurn {
    /// Plain text answer, conversation over.
    Final(String),
    /// The model wants tool results before answering.
    ToolCalls(Vec<ToolCallRequest>),
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ModelTurn, OrchestratorError>;
}

/// OpenAI-compatible HTTP client. Configured entirely from the
/// environment: LLM_BASE_URL, LLM_MODEL, LLM_API_KEY (optional, Ollama
/// needs none).
pub struct HttpChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpChatClient {
    pub fn from_env() -> Result<Self, OrchestratorError> {
        let base_url =
            std::env::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let api_key = std::env::var("LLM_API_KEY").ok();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(MODEL_TIMEOUT_SECS))
            .build()
            .map_err(|e| OrchestratorError::UpstreamModel(format!("client build failed: {}", e)))?;

        Ok(Self { client, base_url, model, api_key })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: Option<String>,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ModelTurn, OrchestratorError> {
        let mut body = json!({
            "model": &self.model,
            "messages": messages,
            "temperature": 0.1,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| OrchestratorError::UpstreamModel(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::UpstreamModel(format!(
                "model endpoint error {}: {}",
                status, body
            )));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::UpstreamModel(format!("bad response body: {}", e)))?;

        let message = wire
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| OrchestratorError::UpstreamModel("no choices in response".into()))?;

        if let Some(calls) = message.tool_calls.filter(|c| !c.is_empty()) {
            let mut requests = Vec::with_capacity(calls.len());
            for (idx, call) in calls.into_iter().enumerate() {
                // Unparseable arguments stay as the raw string inside an
                // object, so validation rejects them with a real message
                // instead of the whole turn failing
                let arguments = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| json!({ "_raw": call.function.arguments }));
                requests.push(ToolCallRequest {
                    id: call.id.unwrap_or_else(|| format!("call_{}", idx)),
                    name: call.function.name,
                    arguments,
                });
            }
            return Ok(ModelTurn::ToolCalls(requests));
        }

        Ok(ModelTurn::Final(message.content.unwrap_or_default()))
    }
}
