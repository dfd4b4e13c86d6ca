use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Model preset (qwen2.5, gemma3, llama-3.3, claude) or provider:model[@temperature]
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// SQLite database file to query
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Optional command to run; the chat UI starts without one
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ask a single question and print the answer
    Ask {
        /// The question to ask
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Show the database file, its size and its tables
    Info,

    /// List the tools offered to the model
    Tools,

    /// Run one tool directly against the database
    Tool {
        /// Tool name, e.g. list_tables
        name: String,

        /// Tool arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_command_starts_chat() {
        let cli = Cli::try_parse_from(["querymancer"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.model.is_none());
    }

    #[test]
    fn test_ask_with_global_flags() {
        let cli = Cli::try_parse_from([
            "querymancer",
            "ask",
            "how",
            "many",
            "users?",
            "--model",
            "claude",
            "-d",
            "shop.sqlite",
        ])
        .unwrap();
        assert_eq!(cli.model.as_deref(), Some("claude"));
        assert_eq!(cli.database, Some(PathBuf::from("shop.sqlite")));
        match cli.command {
            Some(Commands::Ask { message }) => assert_eq!(message.join(" "), "how many users?"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_tool_arguments_default_to_empty_object() {
        let cli = Cli::try_parse_from(["querymancer", "tool", "list_tables"]).unwrap();
        match cli.command {
            Some(Commands::Tool { name, arguments }) => {
                assert_eq!(name, "list_tables");
                assert_eq!(arguments, "{}");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_ask_requires_a_message() {
        assert!(Cli::try_parse_from(["querymancer", "ask"]).is_err());
    }
}
