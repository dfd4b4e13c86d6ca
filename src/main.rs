mod agent;
mod cli;
mod config;
mod db;
mod error;
mod llm;
mod session;
mod tools;
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent::Agent;
use cli::{Cli, Commands};
use config::{Config, ModelConfig};
use db::Database;
use session::History;
use tools::ToolRegistry;

const DEFAULT_LOG_FILTER: &str = "querymancer=info";

/// The chat UI owns the terminal, so it logs to a file; every other command logs to stderr.
fn init_logging(config: &Config, to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let file_layer = if to_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_path)
            .with_context(|| format!("Failed to open log file {}", config.log_path.display()))?;
        Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
    } else {
        None
    };
    let stderr_layer = (!to_file).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}

async fn build_agent(config: &Config, database: Database) -> Result<Agent> {
    let registry = ToolRegistry::new(database);
    let model = llm::create_bound_model(config, &registry)
        .await
        .context("Failed to bind the model")?;
    Ok(Agent::new(model, registry, config.max_tool_rounds))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(model) = &cli.model {
        let model = model
            .parse::<ModelConfig>()
            .with_context(|| format!("Invalid --model '{}'", model))?;
        config = config.with_model(model);
    }
    if let Some(path) = cli.database.clone() {
        config = config.with_database(path);
    }

    init_logging(&config, cli.command.is_none())?;
    info!(
        database = %config.database_path.display(),
        model = %config.model.name,
        "Loaded configuration"
    );

    let database = Database::open(&config.database_path);

    match cli.command {
        None => {
            let database_info = database.info().map_err(|e| e.to_string());
            let agent = build_agent(&config, database).await?;
            tui::run(&config, agent, database_info).await?;
        }
        Some(Commands::Ask { message }) => {
            let agent = build_agent(&config, database).await?;
            let mut history = History::create();
            let answer = agent.ask(&message.join(" "), &mut history).await?;
            println!("{}", answer);
        }
        Some(Commands::Info) => {
            let info = database.info()?;
            println!("File: {}", info.display_path(&config.app_home));
            println!("Size: {:.2} MB", info.size_mb());
            println!("Tables:");
            for table in &info.tables {
                println!("  {} ({} rows)", table.name, table.row_count);
            }
        }
        Some(Commands::Tools) => {
            let registry = ToolRegistry::new(database);
            for tool in registry.list_tools() {
                println!("{}: {}", tool.name, tool.description);
                println!("{}\n", serde_json::to_string_pretty(&tool.parameters)?);
            }
        }
        Some(Commands::Tool { name, arguments }) => {
            let arguments: serde_json::Value =
                serde_json::from_str(&arguments).context("Tool arguments must be valid JSON")?;
            let registry = ToolRegistry::new(database);
            println!("{}", registry.execute(&name, arguments)?);
        }
    }

    Ok(())
}
