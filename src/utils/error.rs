use thiserror::Error;

#[derive(Error, Debug)]
pub enum WumpyError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid route '{path}': {reason}")]
    InvalidRouteError { path: String, reason: String },

    #[error("Invalid header {name}='{value}': {reason}")]
    InvalidHeaderError {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("Unauthorized (401): {message}")]
    Unauthorized { message: String },

    #[error("Forbidden (403): {message}")]
    Forbidden { message: String },

    #[error("Not found (404): {message}")]
    NotFound { message: String },

    #[error("HTTP error {status}: {message}")]
    HttpStatusError { status: u16, message: String },

    #[error("Rate limited (global: {global}), retry after {retry_after:.3}s")]
    RateLimited { retry_after: f64, global: bool },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Suite case '{case}' failed: {message}")]
    SuiteFailure { case: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Api,
    Ratelimit,
    Input,
    Configuration,
    Suite,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl WumpyError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WumpyError::HttpError(_) => ErrorCategory::Network,
            WumpyError::ServerError { .. }
            | WumpyError::Unauthorized { .. }
            | WumpyError::Forbidden { .. }
            | WumpyError::NotFound { .. }
            | WumpyError::HttpStatusError { .. } => ErrorCategory::Api,
            WumpyError::RateLimited { .. } => ErrorCategory::Ratelimit,
            WumpyError::InvalidRouteError { .. }
            | WumpyError::InvalidHeaderError { .. }
            | WumpyError::SerializationError(_) => ErrorCategory::Input,
            WumpyError::ConfigError { .. }
            | WumpyError::ConfigValidationError { .. }
            | WumpyError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            WumpyError::SuiteFailure { .. } => ErrorCategory::Suite,
            WumpyError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WumpyError::NotFound { .. } => ErrorSeverity::Low,
            WumpyError::HttpError(_)
            | WumpyError::ServerError { .. }
            | WumpyError::RateLimited { .. } => ErrorSeverity::Medium,
            WumpyError::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WumpyError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            WumpyError::ServerError { .. } | WumpyError::RateLimited { .. } => true,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            WumpyError::HttpError(_) => {
                "Check network connectivity and that the API base URL is reachable".to_string()
            }
            WumpyError::ServerError { .. } => {
                "Discord is having trouble; wait a moment and try again".to_string()
            }
            WumpyError::Unauthorized { .. } => {
                "Check that the bot token is set and valid".to_string()
            }
            WumpyError::Forbidden { .. } => {
                "The bot lacks permissions for this resource".to_string()
            }
            WumpyError::NotFound { .. } => "Check the route and its parameters".to_string(),
            WumpyError::HttpStatusError { .. } => {
                "Inspect the request body and parameters".to_string()
            }
            WumpyError::RateLimited { retry_after, .. } => {
                format!("Wait at least {:.1}s before retrying", retry_after)
            }
            WumpyError::InvalidRouteError { .. } => {
                "Provide a value for every {placeholder} in the route path".to_string()
            }
            WumpyError::InvalidHeaderError { .. } => {
                "The response carried malformed ratelimit headers".to_string()
            }
            WumpyError::ConfigError { .. }
            | WumpyError::ConfigValidationError { .. }
            | WumpyError::InvalidConfigValueError { .. } => {
                "Review the configuration file and command-line arguments".to_string()
            }
            WumpyError::SuiteFailure { .. } => {
                "The ratelimiter implementation does not behave like Discord expects".to_string()
            }
            WumpyError::IoError(_) => "Check file paths and permissions".to_string(),
            WumpyError::SerializationError(_) => {
                "The payload is not valid JSON".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not reach the API: {}", self),
            ErrorCategory::Api => format!("The API rejected the request: {}", self),
            ErrorCategory::Ratelimit => format!("Request was ratelimited: {}", self),
            ErrorCategory::Input => format!("Invalid input: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Suite => format!("Conformance failure: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, WumpyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_is_retryable() {
        let err = WumpyError::ServerError {
            status: 502,
            message: "Bad Gateway".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Api);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        let err = WumpyError::Forbidden {
            message: "Missing Access".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.user_friendly_message().contains("Missing Access"));
    }

    #[test]
    fn test_io_errors_are_critical_system_errors() {
        let err = WumpyError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "suite.toml"));
        assert_eq!(err.category(), ErrorCategory::System);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.recovery_suggestion(), "Check file paths and permissions");
    }

    #[test]
    fn test_suite_failure_message() {
        let err = WumpyError::SuiteFailure {
            case: "no_more".to_string(),
            message: "not limited".to_string(),
        };
        assert_eq!(err.to_string(), "Suite case 'no_more' failed: not limited");
        assert_eq!(err.category(), ErrorCategory::Suite);
    }
}
