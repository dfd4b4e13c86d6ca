use thiserror::Error;

/// Failures raised by the database shim, the tools, the model binding and the agent loop.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unsupported model provider: {0}")]
    UnsupportedProvider(String),

    #[error("Invalid model configuration: {0}")]
    InvalidModelConfig(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model request failed: {0}")]
    ModelRequest(String),

    #[error("Model kept requesting tools after {0} round-trips")]
    ToolLoopExceeded(usize),
}

impl AgentError {
    /// Tool-level failures are reported back to the model instead of aborting the turn.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AgentError::UnknownTool(_) | AgentError::InvalidQuery(_))
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::ModelRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(AgentError::UnknownTool("drop_everything".into()).is_recoverable());
        assert!(AgentError::InvalidQuery("DROP TABLE users".into()).is_recoverable());
        assert!(!AgentError::DatabaseUnavailable("missing".into()).is_recoverable());
        assert!(!AgentError::ToolLoopExceeded(3).is_recoverable());
    }
}
