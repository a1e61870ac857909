use crate::config::toml_config::TomlConfig;
use crate::utils::error::{Result, WumpyError};
use crate::utils::validation::{validate_non_empty_string, validate_positive_number, Validate};
use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "wumpy-testing")]
#[command(about = "Utilities for testing Wumpy projects")]
pub struct CliConfig {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Print results as JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the ratelimiter conformance suite against the built-in ratelimiter
    Suite {
        /// Time unit in milliseconds the cases are measured in
        #[arg(long)]
        unit_ms: Option<u64>,

        /// Only run these cases
        #[arg(long, value_delimiter = ',')]
        case: Vec<String>,
    },
    /// Make one ratelimited GET request and print the JSON response
    Get {
        /// Route template, e.g. /channels/{channel_id}
        path: String,

        /// Route parameter as name=value, repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        #[arg(long)]
        base_url: Option<String>,
    },
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

impl CliConfig {
    /// The file configuration with command-line overrides applied.
    pub fn resolve(&self) -> Result<TomlConfig> {
        let mut config = match &self.config {
            Some(path) => TomlConfig::from_file(path).map_err(|e| WumpyError::ConfigError {
                message: format!("Failed to load config file '{}': {}", path, e),
            })?,
            None => TomlConfig::default(),
        };

        match &self.command {
            Command::Suite { unit_ms, case } => {
                if let Some(unit_ms) = unit_ms {
                    config.suite.unit_ms = *unit_ms;
                }
                if !case.is_empty() {
                    config.suite.cases = Some(case.clone());
                }
            }
            Command::Get { base_url, .. } => {
                if let Some(base_url) = base_url {
                    config.requester.base_url = base_url.clone();
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Suite { unit_ms, .. } => {
                if let Some(unit_ms) = unit_ms {
                    validate_positive_number("--unit-ms", *unit_ms, 1)?;
                }
            }
            Command::Get { path, .. } => {
                validate_non_empty_string("path", path)?;
                if !path.starts_with('/') {
                    return Err(WumpyError::InvalidConfigValueError {
                        field: "path".to_string(),
                        value: path.clone(),
                        reason: "Route paths start with '/'".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
