use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::{read_json, LlmClient, Message, ModelResponse, ToolCall, ToolDefinition};
use crate::config::ModelConfig;
use crate::error::AgentError;

const CLAUDE_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const MAX_TOKENS: usize = 4096;
// The messages API rejects empty text blocks
const EMPTY_REPLY_TEXT: &str = "(empty reply)";

pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    messages: Vec<ClaudeMessage>,
    max_tokens: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ClaudeTool<'a>>,
}

#[derive(Debug, Serialize)]
struct ClaudeTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ClaudeMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ContentBlock>,
}

impl ClaudeClient {
    pub fn new(
        http: reqwest::Client,
        model: &ModelConfig,
        api_key: Option<String>,
    ) -> Result<Self, AgentError> {
        let api_key = api_key.ok_or_else(|| {
            AgentError::ModelUnavailable("CLAUDE_API_KEY must be set to use Claude".to_string())
        })?;

        Ok(Self {
            http,
            api_key,
            model: model.name.clone(),
            temperature: model.temperature,
        })
    }
}

/// System prompt plus messages. Consecutive tool results share one user turn.
pub(crate) fn to_wire(messages: &[Message]) -> (Option<String>, Vec<ClaudeMessage>) {
    let mut system: Vec<&str> = Vec::new();
    let mut wire: Vec<ClaudeMessage> = Vec::new();

    for message in messages {
        match message {
            Message::System { content } => system.push(content),
            Message::User { content } => wire.push(ClaudeMessage {
                role: "user".to_string(),
                content: vec![ContentBlock::Text {
                    text: content.clone(),
                }],
            }),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::new();
                if !content.trim().is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: content.clone(),
                    });
                } else if tool_calls.is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: EMPTY_REPLY_TEXT.to_string(),
                    });
                }
                blocks.extend(tool_calls.iter().map(|call| ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                }));
                wire.push(ClaudeMessage {
                    role: "assistant".to_string(),
                    content: blocks,
                });
            }
            Message::ToolResult {
                tool_call_id,
                content,
                ..
            } => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: tool_call_id.clone(),
                    content: content.clone(),
                };
                match wire.last_mut() {
                    Some(last) if last.is_tool_results() => last.content.push(block),
                    _ => wire.push(ClaudeMessage {
                        role: "user".to_string(),
                        content: vec![block],
                    }),
                }
            }
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, wire)
}

pub(crate) fn from_wire(
    system: Option<String>,
    messages: Vec<ClaudeMessage>,
) -> Result<Vec<Message>, AgentError> {
    let mut out = Vec::new();
    let mut tool_names: HashMap<String, String> = HashMap::new();

    if let Some(system) = system {
        out.push(Message::system(system));
    }

    for message in messages {
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();

        for block in message.content {
            match block {
                ContentBlock::Text { text: t } => text.push(t),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_names.insert(id.clone(), name.clone());
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments: input,
                    });
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                } => {
                    let name = tool_names.get(&tool_use_id).cloned().unwrap_or_default();
                    out.push(Message::tool_result(tool_use_id, name, content));
                }
            }
        }

        match message.role.as_str() {
            "assistant" => out.push(Message::assistant_with_tools(text.join("\n"), tool_calls)),
            "user" if !text.is_empty() => out.push(Message::user(text.join("\n"))),
            "user" => {}
            other => {
                return Err(AgentError::ModelRequest(format!(
                    "unexpected message role '{}'",
                    other
                )))
            }
        }
    }

    Ok(out)
}

impl ClaudeMessage {
    fn is_tool_results(&self) -> bool {
        self.role == "user"
            && self
                .content
                .iter()
                .all(|block| matches!(block, ContentBlock::ToolResult { .. }))
    }
}

#[async_trait]
impl LlmClient for ClaudeClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, AgentError> {
        let (system, messages) = to_wire(messages);
        let request = ClaudeRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: self.temperature,
            system,
            tools: tools
                .iter()
                .map(|tool| ClaudeTool {
                    name: &tool.name,
                    description: &tool.description,
                    input_schema: &tool.parameters,
                })
                .collect(),
        };

        let response = self
            .http
            .post(CLAUDE_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await?;
        let response: ClaudeResponse = read_json("Claude", response).await?;

        let mut text = Vec::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text: t } => text.push(t),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ContentBlock::ToolResult { .. } => {}
            }
        }
        debug!(tool_calls = tool_calls.len(), "Claude response received");

        Ok(ModelResponse {
            content: text.join("\n"),
            tool_calls,
        })
    }
}
