//! HTTP client for the xAI responses endpoint.
//!
//! Remote search tools are declared by type and run on xAI's side; their
//! invocations come back as `*_call` output items. Function tools are ours:
//! they come back as `function_call` items and are answered with
//! `function_call_output` input items on the next turn.

use std::time::Duration;

use async_trait::async_trait;
use propwatch_models::{HostConfig, TokenUsage};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::AgentError;
use crate::host::{HostRequest, HostResponse, ModelHost, Role, ToolKind, ToolRequest};

pub struct XaiHost {
    /// Never exposed in logs or debug output.
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for XaiHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XaiHost")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl XaiHost {
    pub fn new(api_key: SecretString, config: &HostConfig) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AgentError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        })
    }

    /// Read the key from the environment variable named in the config.
    pub fn from_env(config: &HostConfig) -> Result<Self, AgentError> {
        let key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                AgentError::Transport(format!(
                    "API key not found. Set the {} environment variable",
                    config.api_key_env
                ))
            })?;
        Self::new(SecretString::from(key.trim().to_string()), config)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    input: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    parallel_tool_calls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_turns: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    output: Vec<WireOutputItem>,
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireOutputItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    /// JSON-encoded arguments for function calls.
    #[serde(default)]
    arguments: Option<String>,
    #[serde(default)]
    content: Vec<WireContent>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    annotations: Vec<WireAnnotation>,
}

#[derive(Debug, Deserialize)]
struct WireAnnotation {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    output_tokens_details: Option<WireOutputDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct WireOutputDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

fn build_wire_request(model: &str, request: &HostRequest) -> WireRequest {
    let mut input = Vec::new();
    for message in &request.messages {
        match message.role {
            Role::Tool => input.push(json!({
                "type": "function_call_output",
                "call_id": message.tool_call_id.clone().unwrap_or_default(),
                "output": message.content,
            })),
            role => {
                if !message.content.is_empty() || message.tool_calls.is_empty() {
                    let role = match role {
                        Role::System => "system",
                        Role::User => "user",
                        _ => "assistant",
                    };
                    input.push(json!({"role": role, "content": message.content}));
                }
                for call in &message.tool_calls {
                    input.push(json!({
                        "type": "function_call",
                        "call_id": call.id,
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    }));
                }
            }
        }
    }

    let mut tools: Vec<Value> = request
        .remote_tools
        .iter()
        .map(|t| json!({"type": t.as_str()}))
        .collect();
    tools.extend(request.local_tools.iter().map(|t| {
        json!({
            "type": "function",
            "name": t.name,
            "description": t.description,
            "parameters": t.parameters,
        })
    }));

    WireRequest {
        model: model.to_string(),
        input,
        tools,
        parallel_tool_calls: request.sampling.parallel_tool_calls,
        max_turns: request.sampling.max_turns,
        reasoning: request
            .sampling
            .reasoning_effort
            .as_ref()
            .map(|effort| json!({"effort": effort})),
    }
}

fn parse_wire_response(wire: WireResponse) -> Result<HostResponse, AgentError> {
    let mut text = String::new();
    let mut citations = wire.citations;
    let mut tool_requests = Vec::new();

    for item in wire.output {
        match item.item_type.as_str() {
            "message" => {
                for content in item.content {
                    if let Some(t) = content.text {
                        text.push_str(&t);
                    }
                    citations.extend(content.annotations.into_iter().filter_map(|a| a.url));
                }
            }
            "function_call" => {
                let raw = item.arguments.unwrap_or_else(|| "{}".to_string());
                let arguments = serde_json::from_str(&raw).map_err(|e| {
                    AgentError::Parse(format!("function_call arguments are not JSON: {e}"))
                })?;
                tool_requests.push(ToolRequest {
                    id: item.call_id.or(item.id).unwrap_or_default(),
                    name: item.name.unwrap_or_default(),
                    arguments,
                    kind: ToolKind::Local,
                });
            }
            other if other.ends_with("_call") => {
                tool_requests.push(ToolRequest {
                    id: item.id.unwrap_or_default(),
                    name: other.trim_end_matches("_call").to_string(),
                    arguments: Value::Null,
                    kind: ToolKind::Remote,
                });
            }
            _ => {}
        }
    }

    let mut seen = std::collections::HashSet::new();
    citations.retain(|c| seen.insert(c.clone()));

    let usage = wire.usage.unwrap_or_default();
    Ok(HostResponse {
        text,
        citations,
        usage: TokenUsage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            reasoning_tokens: usage
                .output_tokens_details
                .map(|d| d.reasoning_tokens)
                .unwrap_or_default(),
            total_tokens: usage.total_tokens,
        },
        tool_requests,
    })
}

#[async_trait]
impl ModelHost for XaiHost {
    fn name(&self) -> &str {
        "xai"
    }

    async fn respond(&self, request: &HostRequest) -> Result<HostResponse, AgentError> {
        let url = format!("{}/responses", self.api_base);
        let body = build_wire_request(&self.model, request);
        debug!(
            model = %self.model,
            inputs = body.input.len(),
            tools = body.tools.len(),
            "Sending turn"
        );

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Transport(format!("xAI request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Http { status, body });
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Transport(format!("Failed to decode xAI response: {e}")))?;
        parse_wire_response(wire)
    }
}
