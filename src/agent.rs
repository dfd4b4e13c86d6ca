//! The question/answer loop between the model and the tools.
//!
//! Each call to [`Agent::ask`] moves through
//! `AwaitingModel -> (ToolRequested -> ExecutingTools -> AwaitingModel)* -> Finalized`.
//! Every tool call appended to the history gets exactly one result appended
//! after it before the model sees the history again, even when the turn fails.

use std::fmt;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::llm::{BoundModel, Message, ToolCall};
use crate::session::History;
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentState {
    AwaitingModel,
    ToolRequested,
    ExecutingTools,
    Finalized,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::AwaitingModel => "awaiting_model",
            AgentState::ToolRequested => "tool_requested",
            AgentState::ExecutingTools => "executing_tools",
            AgentState::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

pub struct Agent {
    model: BoundModel,
    registry: ToolRegistry,
    max_tool_rounds: usize,
}

impl Agent {
    pub fn new(model: BoundModel, registry: ToolRegistry, max_tool_rounds: usize) -> Self {
        Self {
            model,
            registry,
            max_tool_rounds,
        }
    }

    pub fn model(&self) -> &BoundModel {
        &self.model
    }

    /// Answer `user_text`, appending every exchanged message to `history`.
    pub async fn ask(&self, user_text: &str, history: &mut History) -> Result<String, AgentError> {
        history.append(Message::user(user_text));
        let mut rounds = 0;

        loop {
            transition(AgentState::AwaitingModel, rounds);
            let response = self.model.respond(history.messages()).await?;

            if !response.wants_tools() {
                transition(AgentState::Finalized, rounds);
                history.append(Message::assistant(response.content.clone()));
                return Ok(response.content);
            }

            transition(AgentState::ToolRequested, rounds);
            if rounds >= self.max_tool_rounds {
                warn!(rounds, "Model exceeded the tool round-trip limit");
                return Err(AgentError::ToolLoopExceeded(rounds));
            }
            rounds += 1;

            history.append(Message::assistant_with_tools(
                response.content,
                response.tool_calls.clone(),
            ));
            transition(AgentState::ExecutingTools, rounds);
            self.run_tools(&response.tool_calls, history)?;
        }
    }

    fn run_tools(&self, calls: &[ToolCall], history: &mut History) -> Result<(), AgentError> {
        for (index, call) in calls.iter().enumerate() {
            match self.registry.invoke(call) {
                Ok(result) => history.append(Message::tool_result(
                    result.tool_call_id,
                    result.name,
                    result.content,
                )),
                Err(err) => {
                    for pending in &calls[index..] {
                        history.append(Message::tool_result(
                            pending.id.clone(),
                            pending.name.clone(),
                            format!("Error: not executed: {}", err),
                        ));
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

fn transition(state: AgentState, round: usize) {
    debug!(state = %state, round, "Agent state");
}
