//! Command-line argument parsing for appquery.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// Output format for `ask`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// The formatted answer text.
    #[default]
    Text,
    /// The whole formatted response as JSON.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// Guarded natural-language analytics over app metrics.
#[derive(Parser, Debug)]
#[command(name = "appquery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// LLM provider (openai or mock), overriding the config file
    #[arg(long, value_name = "PROVIDER", global = true)]
    pub provider: Option<String>,

    /// Metrics database URL (postgres:// or sqlite:), overriding the config file
    #[arg(long, value_name = "URL", global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Answer a question about the app metrics
    Ask {
        /// The question, in plain language
        question: String,

        /// Skip the result cache for this question
        #[arg(long)]
        no_cache: bool,

        /// Print the SQL that produced the answer
        #[arg(long)]
        show_sql: bool,

        /// Output format (text or json)
        #[arg(long, value_name = "FORMAT", default_value = "text")]
        format: OutputFormat,
    },

    /// Check a SQL statement against the safety rules
    Validate {
        /// The SQL statement
        sql: String,
    },

    /// Strip comments and normalize whitespace in a SQL statement
    Sanitize {
        /// The SQL statement
        sql: String,
    },

    /// Inspect or maintain the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Show entry count, total hits and the most asked questions
    Stats,
    /// Remove every cached answer
    Clear,
    /// Apply the configured size and age limits
    Prune,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies command-line overrides on top of file and environment config.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(provider) = &self.provider {
            config.llm.provider = provider.clone();
        }
        if let Some(url) = &self.database_url {
            config.database.url = Some(url.clone());
        }
    }
}
