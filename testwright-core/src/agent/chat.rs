//! Agent executor backed by an OpenAI-compatible chat completions API
//!
//! Works against Azure OpenAI deployments (when an api-version is configured)
//! and plain OpenAI-style endpoints. The tool belt is registered as function
//! tools; tool calls are executed locally and fed back until the model gives
//! a final answer or the round limit is hit.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::executor::AgentExecutor;
use super::prompts::system_prompt;
use super::response::{AgentResponse, ResponseSchema};
use super::types::AgentRole;
use crate::config::ChatConfig;
use crate::tools::ToolBelt;
use crate::{Error, Result};

const OPENAI_DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Where and how to call the chat API
#[derive(Clone)]
pub struct ChatEndpoint {
    url: String,
    model: Option<String>,
    auth: ChatAuth,
}

#[derive(Clone)]
enum ChatAuth {
    /// Azure `api-key` header
    ApiKey(String),
    /// `Authorization: Bearer`
    Bearer(String),
    None,
}

impl std::fmt::Debug for ChatEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEndpoint")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatEndpoint {
    /// Build the endpoint from configuration
    ///
    /// `model` overrides the configured deployment name.
    pub fn from_config(
        config: &ChatConfig,
        model: Option<&str>,
        api_key: Option<String>,
    ) -> Result<Self> {
        let deployment = model
            .map(String::from)
            .or_else(|| config.deployment.clone());

        if let Some(version) = &config.api_version {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                Error::Config("chat.endpoint is required for Azure OpenAI".to_string())
            })?;
            let deployment = deployment.ok_or_else(|| {
                Error::Config("chat.deployment is required for Azure OpenAI".to_string())
            })?;
            return Ok(Self {
                url: format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    endpoint.trim_end_matches('/'),
                    deployment,
                    version
                ),
                model: None,
                auth: api_key.map(ChatAuth::ApiKey).unwrap_or(ChatAuth::None),
            });
        }

        let endpoint = config
            .endpoint
            .as_deref()
            .unwrap_or(OPENAI_DEFAULT_ENDPOINT)
            .trim_end_matches('/');
        let model = deployment.ok_or_else(|| {
            Error::Config("A model is required (chat.deployment or --model)".to_string())
        })?;

        Ok(Self {
            url: format!("{}/chat/completions", endpoint),
            model: Some(model),
            auth: api_key.map(ChatAuth::Bearer).unwrap_or(ChatAuth::None),
        })
    }

    /// Endpoint with an explicit URL, used against local servers
    pub fn custom(url: impl Into<String>, model: Option<String>) -> Self {
        Self {
            url: url.into(),
            model,
            auth: ChatAuth::None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    fn tool_result(call_id: &str, content: String) -> Self {
        Self {
            tool_call_id: Some(call_id.to_string()),
            ..Self::new("tool", content)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Runs one role against a chat completions endpoint
pub struct ChatExecutor {
    name: String,
    role: AgentRole,
    client: reqwest::Client,
    endpoint: ChatEndpoint,
    tools: ToolBelt,
    schema: Option<ResponseSchema>,
    max_tool_rounds: usize,
}

impl ChatExecutor {
    pub fn new(
        role: AgentRole,
        endpoint: ChatEndpoint,
        tools: ToolBelt,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        // Only the implementer may write into the workspace
        let tools = if role.can_write() {
            tools
        } else {
            tools.read_only()
        };

        Ok(Self {
            name: format!("{}(chat)", role),
            role,
            client,
            endpoint,
            tools,
            schema: role.schema(),
            max_tool_rounds: 25,
        })
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    fn response_format(&self) -> Option<Value> {
        self.schema.as_ref().map(|schema| {
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": true
                }
            })
        })
    }

    async fn complete(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatMessage> {
        let request = ChatRequest {
            model: self.endpoint.model.as_deref(),
            messages,
            tools,
            response_format: self.response_format(),
        };

        let mut builder = self.client.post(&self.endpoint.url).json(&request);
        builder = match &self.endpoint.auth {
            ChatAuth::ApiKey(key) => builder.header("api-key", key),
            ChatAuth::Bearer(key) => builder.bearer_auth(key),
            ChatAuth::None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!(
                "{}: chat completion failed ({}): {}",
                self.name,
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| Error::Agent(format!("{}: response had no choices", self.name)))
    }

    /// Decode the final content against the role's schema
    fn decode(&self, text: &str) -> Option<Value> {
        let schema = self.schema.as_ref()?;
        let value = serde_json::from_str::<Value>(text.trim())
            .ok()
            .filter(|v| schema.accepts(v))
            .or_else(|| schema.extract(text));
        if value.is_none() {
            warn!(agent = %self.name, "Structured output could not be decoded");
        }
        value
    }
}

#[async_trait]
impl AgentExecutor for ChatExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, prompt: &str) -> Result<AgentResponse> {
        info!(agent = %self.name, "Running agent");

        let definitions = self.tools.definitions();
        let mut messages = vec![
            ChatMessage::new("system", system_prompt(self.role)),
            ChatMessage::new("user", prompt),
        ];

        for round in 0..=self.max_tool_rounds {
            // Withhold tools on the last round to force an answer
            let tools: &[Value] = if round < self.max_tool_rounds {
                &definitions
            } else {
                &[]
            };
            let reply = self.complete(&messages, tools).await?;

            if reply.tool_calls.is_empty() || tools.is_empty() {
                let text = reply.content.unwrap_or_default();
                let value = self.decode(&text);
                debug!(agent = %self.name, rounds = round, chars = text.len(), "Agent finished");
                return Ok(AgentResponse { text, value });
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in calls {
                let args: Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
                let result = self.tools.invoke(&call.function.name, &args).await;
                messages.push(ChatMessage::tool_result(&call.id, result));
            }
        }

        Err(Error::Agent(format!(
            "{}: exceeded {} tool rounds",
            self.name, self.max_tool_rounds
        )))
    }
}
