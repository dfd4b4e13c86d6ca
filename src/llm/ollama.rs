use async_trait::async_trait;
use ollama_rs::Ollama;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{read_json, LlmClient, Message, ModelResponse, ToolCall, ToolDefinition};
use crate::config::{ModelConfig, OllamaSettings};
use crate::error::AgentError;

/// Client for a local Ollama server's `/api/chat`.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    seed: u64,
    context_window: u64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
    options: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: OllamaMessage,
}

impl OllamaClient {
    /// Build the client and make sure the server is up and has the model pulled.
    pub async fn connect(
        http: reqwest::Client,
        model: &ModelConfig,
        settings: &OllamaSettings,
        seed: u64,
    ) -> Result<Self, AgentError> {
        reqwest::Url::parse(&settings.host).map_err(|e| {
            AgentError::ModelUnavailable(format!("invalid OLLAMA_HOST '{}': {}", settings.host, e))
        })?;

        let ollama = Ollama::new(settings.host.clone(), settings.port);
        let local_models = ollama.list_local_models().await.map_err(|e| {
            AgentError::ModelUnavailable(format!(
                "Ollama is not reachable at {} ({}). Is `ollama serve` running?",
                settings.base_url(),
                e
            ))
        })?;

        let wanted = strip_latest(&model.name);
        if !local_models.iter().any(|m| strip_latest(&m.name) == wanted) {
            return Err(AgentError::ModelUnavailable(format!(
                "model '{}' is not available locally, run `ollama pull {}`",
                model.name, model.name
            )));
        }

        Ok(Self {
            http,
            base_url: settings.base_url(),
            model: model.name.clone(),
            temperature: model.temperature,
            seed,
            context_window: settings.context_window,
        })
    }

    fn to_wire(messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|message| match message {
                Message::System { content } => OllamaMessage::plain("system", content),
                Message::User { content } => OllamaMessage::plain("user", content),
                Message::Assistant {
                    content,
                    tool_calls,
                } => OllamaMessage {
                    tool_calls: tool_calls
                        .iter()
                        .map(|call| OllamaToolCall {
                            function: OllamaFunction {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect(),
                    ..OllamaMessage::plain("assistant", content)
                },
                Message::ToolResult { name, content, .. } => OllamaMessage {
                    tool_name: Some(name.clone()),
                    ..OllamaMessage::plain("tool", content)
                },
            })
            .collect()
    }

    fn tool_schema(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect()
    }
}

impl OllamaMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

fn strip_latest(name: &str) -> &str {
    name.strip_suffix(":latest").unwrap_or(name)
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, AgentError> {
        let request = ChatRequest {
            model: &self.model,
            messages: Self::to_wire(messages),
            tools: Self::tool_schema(tools),
            stream: false,
            options: json!({
                "temperature": self.temperature,
                "seed": self.seed,
                "num_ctx": self.context_window,
            }),
        };

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;
        let response: ChatResponse = read_json("Ollama", response).await?;

        // Ollama does not assign call ids
        let tool_calls: Vec<ToolCall> = response
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();
        debug!(tool_calls = tool_calls.len(), "Ollama response received");

        Ok(ModelResponse {
            content: response.message.content,
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_wire_maps_roles() {
        let history = vec![
            Message::system("sys"),
            Message::user("how many users?"),
            Message::assistant_with_tools(
                "",
                vec![ToolCall {
                    id: "call_1".into(),
                    name: "count_rows".into(),
                    arguments: json!({"table_name": "users"}),
                }],
            ),
            Message::tool_result("call_1", "count_rows", "3"),
            Message::assistant("There are 3 users."),
        ];
        let wire = OllamaClient::to_wire(&history);
        let roles: Vec<&str> = wire.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "assistant"]);
        assert_eq!(wire[2].tool_calls[0].function.name, "count_rows");
        assert_eq!(wire[3].tool_name.as_deref(), Some("count_rows"));
        assert_eq!(wire[3].content, "3");
    }

    #[test]
    fn test_response_with_tool_calls_parses() {
        let raw = json!({
            "model": "qwen2.5",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "list_tables", "arguments": {}}}]
            },
            "done": true
        });
        let parsed: ChatResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.message.tool_calls[0].function.name, "list_tables");
    }

    #[test]
    fn test_strip_latest() {
        assert_eq!(strip_latest("qwen2.5:latest"), "qwen2.5");
        assert_eq!(strip_latest("PetrosStav/gemma3-tools:12b"), "PetrosStav/gemma3-tools:12b");
    }
}
