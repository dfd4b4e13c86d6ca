//! Process-wide configuration.
//!
//! Read once at startup from the environment (after `.env` is loaded):
//! - `APP_HOME` - base directory. Defaults to the current directory.
//! - `QUERYMANCER_DATABASE` - database file. Defaults to `$APP_HOME/data/ecomerce.sqlite`.
//! - `QUERYMANCER_MODEL` - preset name or `provider:model[@temperature]`. Defaults to `qwen2.5`.
//! - `QUERYMANCER_SEED` - seed for sampling and the loading messages. Defaults to `42`.
//! - `QUERYMANCER_MAX_TOOL_ROUNDS` - tool round-trips allowed per question. Defaults to `10`.
//! - `QUERYMANCER_TIMEOUT_SECS` - timeout for every model request. Defaults to `120`.
//! - `OLLAMA_HOST` / `OLLAMA_PORT` / `OLLAMA_CONTEXT_WINDOW` - local inference server.
//! - `GROQ_API_KEY` / `CLAUDE_API_KEY` - hosted providers.

use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AgentError;

pub const DEFAULT_MODEL: &str = "qwen2.5";
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
// Larger windows allow longer conversations but slow the responses down
pub const DEFAULT_OLLAMA_CONTEXT_WINDOW: u64 = 2848;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProvider {
    Ollama,
    Groq,
    Anthropic,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProvider::Ollama => "ollama",
            ModelProvider::Groq => "groq",
            ModelProvider::Anthropic => "anthropic",
        }
    }
}

impl FromStr for ModelProvider {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(ModelProvider::Ollama),
            "groq" => Ok(ModelProvider::Groq),
            "anthropic" | "claude" => Ok(ModelProvider::Anthropic),
            other => Err(AgentError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which model to talk to and how.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    /// Sampling randomness, 0.0 (deterministic) to 1.0
    pub temperature: f32,
    pub provider: ModelProvider,
}

impl ModelConfig {
    pub fn new(name: &str, temperature: f32, provider: ModelProvider) -> Self {
        Self {
            name: name.to_string(),
            temperature,
            provider,
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "qwen2.5" => Some(Self::new("qwen2.5", 0.0, ModelProvider::Ollama)),
            // Tool calling on this one is unreliable
            "gemma3" => Some(Self::new(
                "PetrosStav/gemma3-tools:12b",
                0.7,
                ModelProvider::Ollama,
            )),
            "llama-3.3" => Some(Self::new(
                "llama-3.3-70b-versatile",
                0.0,
                ModelProvider::Groq,
            )),
            "claude" => Some(Self::new(
                "claude-3-5-sonnet-20241022",
                0.0,
                ModelProvider::Anthropic,
            )),
            _ => None,
        }
    }

    pub fn preset_names() -> &'static [&'static str] {
        &["qwen2.5", "gemma3", "llama-3.3", "claude"]
    }
}

impl FromStr for ModelConfig {
    type Err = AgentError;

    /// Accepts a preset name or `provider:model[@temperature]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(preset) = Self::preset(s) {
            return Ok(preset);
        }

        let (provider, rest) = s.split_once(':').ok_or_else(|| {
            AgentError::UnsupportedProvider(format!(
                "'{}' is neither a preset ({}) nor provider:model",
                s,
                Self::preset_names().join(", ")
            ))
        })?;
        let provider = provider.parse::<ModelProvider>()?;

        let (name, temperature) = match rest.rsplit_once('@') {
            Some((name, temp)) => {
                let temperature = temp.parse::<f32>().map_err(|_| {
                    AgentError::InvalidModelConfig(format!("invalid temperature '{}'", temp))
                })?;
                (name, temperature)
            }
            None => (rest, 0.0),
        };

        if name.is_empty() {
            return Err(AgentError::InvalidModelConfig("empty model name".to_string()));
        }
        if !(0.0..=1.0).contains(&temperature) {
            return Err(AgentError::InvalidModelConfig(format!(
                "temperature {} is outside 0.0-1.0",
                temperature
            )));
        }

        Ok(Self::new(name, temperature, provider))
    }
}

#[derive(Debug, Clone)]
pub struct OllamaSettings {
    pub host: String,
    pub port: u16,
    pub context_window: u64,
}

impl OllamaSettings {
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.host.trim_end_matches('/'), self.port)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_home: PathBuf,
    pub database_path: PathBuf,
    pub log_path: PathBuf,
    pub model: ModelConfig,
    pub seed: u64,
    pub max_tool_rounds: usize,
    pub request_timeout: Duration,
    pub ollama: OllamaSettings,
    pub groq_api_key: Option<String>,
    pub claude_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let app_home = match var("APP_HOME") {
            Some(home) => PathBuf::from(home),
            None => env::current_dir().context("Failed to resolve the current directory")?,
        };

        let database_path = var("QUERYMANCER_DATABASE")
            .map(PathBuf::from)
            .unwrap_or_else(|| app_home.join("data").join("ecomerce.sqlite"));

        let model = var("QUERYMANCER_MODEL")
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
            .parse::<ModelConfig>()
            .context("Invalid QUERYMANCER_MODEL")?;

        let seed = parse_or(var("QUERYMANCER_SEED"), DEFAULT_SEED, "QUERYMANCER_SEED")?;
        let max_tool_rounds = parse_or(
            var("QUERYMANCER_MAX_TOOL_ROUNDS"),
            DEFAULT_MAX_TOOL_ROUNDS,
            "QUERYMANCER_MAX_TOOL_ROUNDS",
        )?;
        let timeout_secs = parse_or(
            var("QUERYMANCER_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
            "QUERYMANCER_TIMEOUT_SECS",
        )?;

        let ollama = OllamaSettings {
            host: var("OLLAMA_HOST").unwrap_or_else(|| "http://localhost".to_string()),
            port: parse_or(var("OLLAMA_PORT"), 11434, "OLLAMA_PORT")?,
            context_window: parse_or(
                var("OLLAMA_CONTEXT_WINDOW"),
                DEFAULT_OLLAMA_CONTEXT_WINDOW,
                "OLLAMA_CONTEXT_WINDOW",
            )?,
        };

        Ok(Self {
            log_path: app_home.join("querymancer.log"),
            app_home,
            database_path,
            model,
            seed,
            max_tool_rounds,
            request_timeout: Duration::from_secs(timeout_secs),
            ollama,
            groq_api_key: var("GROQ_API_KEY"),
            claude_api_key: var("CLAUDE_API_KEY"),
        })
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_database(mut self, path: PathBuf) -> Self {
        self.database_path = path;
        self
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T, key: &str) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("Invalid value for {}: {}", key, raw)),
        None => Ok(default),
    }
}
