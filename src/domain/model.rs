use std::collections::HashMap;

/// Response headers as handed to a ratelimiter, names in any case.
pub type Headers = HashMap<String, String>;

/// Value of `X-RateLimit-Scope`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RatelimitScope {
    User,
    Global,
    Shared,
    Other(String),
}

impl RatelimitScope {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => RatelimitScope::User,
            "global" => RatelimitScope::Global,
            "shared" => RatelimitScope::Shared,
            other => RatelimitScope::Other(other.to_string()),
        }
    }
}
