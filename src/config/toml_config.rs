use crate::rest::requester::RequesterConfig;
use crate::suites::ratelimiter::{CASES, DEFAULT_UNIT};
use crate::utils::error::{Result, WumpyError};
use crate::utils::validation::{validate_one_of, validate_range, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}]+)\}").expect("environment variable pattern is valid")
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub suite: SuiteConfig,
    #[serde(default)]
    pub requester: RequesterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,
    pub cases: Option<Vec<String>>,
}

fn default_unit_ms() -> u64 {
    DEFAULT_UNIT.as_millis() as u64
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            unit_ms: default_unit_ms(),
            cases: None,
        }
    }
}

impl SuiteConfig {
    pub fn unit(&self) -> Duration {
        Duration::from_millis(self.unit_ms)
    }
}

impl TomlConfig {
    /// Loads the configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(WumpyError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parses TOML after substituting `${VAR}` references.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| WumpyError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Unset variables are left as written.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_range("suite.unit_ms", self.suite.unit_ms, 1, 10_000)?;
        if let Some(cases) = &self.suite.cases {
            validate_one_of("suite.cases", cases, &CASES)?;
        }

        if let Some(token) = &self.requester.token {
            if ENV_VAR.is_match(token) {
                return Err(WumpyError::ConfigValidationError {
                    field: "requester.token".to_string(),
                    message: format!("environment variable in '{}' is not set", token),
                });
            }
        }

        self.requester.validate()
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
