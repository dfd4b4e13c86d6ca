mod claude;
mod models;
mod ollama;
mod openai;

pub use claude::ClaudeClient;
pub use models::{Message, ModelResponse, Role, ToolCall, ToolDefinition};
pub use ollama::OllamaClient;
pub use openai::GroqClient;

use async_trait::async_trait;
use tracing::info;

use crate::config::{Config, ModelProvider};
use crate::error::AgentError;
use crate::tools::ToolRegistry;

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// One round-trip: send the whole transcript, get text and/or tool calls back.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, AgentError>;
}

/// A client with the tool schema attached.
pub struct BoundModel {
    client: Box<dyn LlmClient>,
    tools: Vec<ToolDefinition>,
}

impl BoundModel {
    pub fn new(client: Box<dyn LlmClient>, tools: Vec<ToolDefinition>) -> Self {
        Self { client, tools }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub async fn respond(&self, history: &[Message]) -> Result<ModelResponse, AgentError> {
        self.client.chat(history, &self.tools).await
    }
}

/// Resolve the configured provider, build its client and attach the registry's tools.
pub async fn create_bound_model(
    config: &Config,
    registry: &ToolRegistry,
) -> Result<BoundModel, AgentError> {
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| AgentError::ModelUnavailable(format!("failed to build HTTP client: {}", e)))?;

    let client: Box<dyn LlmClient> = match config.model.provider {
        ModelProvider::Ollama => Box::new(
            OllamaClient::connect(http, &config.model, &config.ollama, config.seed).await?,
        ),
        ModelProvider::Groq => Box::new(GroqClient::new(
            http,
            &config.model,
            config.groq_api_key.clone(),
            config.seed,
        )?),
        ModelProvider::Anthropic => Box::new(ClaudeClient::new(
            http,
            &config.model,
            config.claude_api_key.clone(),
        )?),
    };

    info!(
        provider = %config.model.provider,
        model = %config.model.name,
        temperature = config.model.temperature,
        tools = registry.list_tools().len(),
        "Model bound"
    );
    Ok(BoundModel::new(client, registry.list_tools().to_vec()))
}

/// Read an HTTP response body, turning non-success statuses into `ModelRequest` errors.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    backend: &str,
    response: reqwest::Response,
) -> Result<T, AgentError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(AgentError::ModelRequest(format!(
            "{} API error: {}: {}",
            backend, status, text
        )));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| AgentError::ModelRequest(format!("failed to parse {} response: {}", backend, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::db::Database;

    #[tokio::test]
    async fn test_hosted_provider_without_key_is_unavailable() {
        let config = Config::from_lookup(|key| match key {
            "APP_HOME" => Some("/tmp".to_string()),
            _ => None,
        })
        .unwrap()
        .with_model(ModelConfig::preset("llama-3.3").unwrap());
        let registry = ToolRegistry::new(Database::open("/tmp/none.sqlite"));

        let err = create_bound_model(&config, &registry).await.err().unwrap();
        assert!(matches!(err, AgentError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_hosted_provider_binds_tools() {
        let config = Config::from_lookup(|key| match key {
            "APP_HOME" => Some("/tmp".to_string()),
            "CLAUDE_API_KEY" => Some("sk-test".to_string()),
            _ => None,
        })
        .unwrap()
        .with_model(ModelConfig::preset("claude").unwrap());
        let registry = ToolRegistry::new(Database::open("/tmp/none.sqlite"));

        let model = create_bound_model(&config, &registry).await.unwrap();
        assert_eq!(model.tools().len(), 5);
        assert_eq!(model.model_name(), "claude-3-5-sonnet-20241022");
    }
}
