use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{read_json, LlmClient, Message, ModelResponse, ToolCall, ToolDefinition};
use crate::config::ModelConfig;
use crate::error::AgentError;

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Client for Groq's OpenAI-compatible chat completions endpoint.
pub struct GroqClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    seed: u64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    seed: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded arguments object
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

fn function_kind() -> String {
    "function".to_string()
}

impl GroqClient {
    pub fn new(
        http: reqwest::Client,
        model: &ModelConfig,
        api_key: Option<String>,
        seed: u64,
    ) -> Result<Self, AgentError> {
        let api_key = api_key.ok_or_else(|| {
            AgentError::ModelUnavailable("GROQ_API_KEY must be set to use Groq models".to_string())
        })?;

        Ok(Self {
            http,
            api_key,
            model: model.name.clone(),
            temperature: model.temperature,
            seed,
        })
    }
}

pub(crate) fn to_wire(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|message| match message {
            Message::System { content } => WireMessage::plain("system", content),
            Message::User { content } => WireMessage::plain("user", content),
            Message::Assistant {
                content,
                tool_calls,
            } => WireMessage {
                content: if content.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(content.clone())
                },
                tool_calls: tool_calls.iter().map(WireToolCall::from).collect(),
                ..WireMessage::plain("assistant", content)
            },
            Message::ToolResult {
                tool_call_id,
                name,
                content,
            } => WireMessage {
                tool_call_id: Some(tool_call_id.clone()),
                name: Some(name.clone()),
                ..WireMessage::plain("tool", content)
            },
        })
        .collect()
}

pub(crate) fn from_wire(messages: Vec<WireMessage>) -> Result<Vec<Message>, AgentError> {
    messages.into_iter().map(WireMessage::into_message).collect()
}

impl WireMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    fn into_message(self) -> Result<Message, AgentError> {
        let content = self.content.unwrap_or_default();
        match self.role.as_str() {
            "system" => Ok(Message::system(content)),
            "user" => Ok(Message::user(content)),
            "assistant" => Ok(Message::assistant_with_tools(
                content,
                self.tool_calls.into_iter().map(ToolCall::from).collect(),
            )),
            "tool" => Ok(Message::tool_result(
                self.tool_call_id.unwrap_or_default(),
                self.name.unwrap_or_default(),
                content,
            )),
            other => Err(AgentError::ModelRequest(format!(
                "unexpected message role '{}'",
                other
            ))),
        }
    }
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        }
    }
}

impl From<WireToolCall> for ToolCall {
    fn from(call: WireToolCall) -> Self {
        // Malformed JSON is passed on as a string so the tool reports it back
        let arguments = serde_json::from_str(&call.function.arguments)
            .unwrap_or(Value::String(call.function.arguments));
        ToolCall {
            id: call.id,
            name: call.function.name,
            arguments,
        }
    }
}

#[async_trait]
impl LlmClient for GroqClient {
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
            messages: to_wire(messages),
            temperature: self.temperature,
            seed: self.seed,
            tools: tools
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
                .collect(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
        };

        let response = self
            .http
            .post(GROQ_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response: ChatResponse = read_json("Groq", response).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::ModelRequest("empty response from Groq".to_string()))?;
        debug!(tool_calls = choice.message.tool_calls.len(), "Groq response received");

        Ok(ModelResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls.into_iter().map(ToolCall::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Vec<Message> {
        vec![
            Message::system("You are Querymancer."),
            Message::user("Who spent the most?"),
            Message::assistant_with_tools(
                "",
                vec![
                    ToolCall {
                        id: "call_a".into(),
                        name: "list_tables".into(),
                        arguments: json!({}),
                    },
                    ToolCall {
                        id: "call_b".into(),
                        name: "run_query".into(),
                        arguments: json!({"sql": "SELECT 1"}),
                    },
                ],
            ),
            Message::tool_result("call_a", "list_tables", "orders, users"),
            Message::tool_result("call_b", "run_query", "1\n1"),
            Message::assistant("Chen spent the most."),
        ]
    }

    #[test]
    fn test_round_trip_preserves_transcript() {
        let history = transcript();
        let wire = to_wire(&history);
        let json = serde_json::to_string(&wire).unwrap();
        let decoded: Vec<WireMessage> = serde_json::from_str(&json).unwrap();
        let rebuilt = from_wire(decoded).unwrap();
        assert_eq!(rebuilt, history);
    }

    #[test]
    fn test_wire_shape_for_tool_calls() {
        let wire = serde_json::to_value(to_wire(&transcript())).unwrap();
        assert_eq!(wire[2]["content"], Value::Null);
        assert_eq!(wire[2]["tool_calls"][1]["type"], "function");
        assert_eq!(wire[2]["tool_calls"][1]["function"]["arguments"], "{\"sql\":\"SELECT 1\"}");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_a");
    }

    #[test]
    fn test_malformed_arguments_become_string() {
        let call = ToolCall::from(WireToolCall {
            id: "x".into(),
            kind: function_kind(),
            function: WireFunction {
                name: "run_query".into(),
                arguments: "{not json".into(),
            },
        });
        assert_eq!(call.arguments, Value::String("{not json".into()));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let err = from_wire(vec![WireMessage::plain("wizard", "hi")]).unwrap_err();
        assert!(matches!(err, AgentError::ModelRequest(_)));
    }
}
