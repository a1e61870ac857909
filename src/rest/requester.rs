use crate::domain::ports::Ratelimiter;
use crate::rest::headers::{to_headers, RatelimitHeaders};
use crate::rest::route::Route;
use crate::utils::error::{Result, WumpyError};
use crate::utils::validation::{validate_non_empty_string, validate_range, validate_url, Validate};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequesterConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub token: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    pub user_agent: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot (https://github.com/wumpyproject/wumpy, {})",
        env!("CARGO_PKG_VERSION")
    )
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            retry_backoff_ms: default_retry_backoff_ms(),
            user_agent: None,
        }
    }
}

impl Validate for RequesterConfig {
    fn validate(&self) -> Result<()> {
        validate_url("requester.base_url", &self.base_url)?;
        validate_range("requester.max_retries", self.max_retries, 0, 10)?;
        validate_range("requester.timeout_seconds", self.timeout_seconds, 1, 300)?;
        validate_range("requester.retry_backoff_ms", self.retry_backoff_ms, 0, 60_000)?;
        if let Some(token) = &self.token {
            validate_non_empty_string("requester.token", token)?;
        }
        if let Some(agent) = &self.user_agent {
            validate_non_empty_string("requester.user_agent", agent)?;
        }
        Ok(())
    }
}

/// Makes Discord REST requests through a [`Ratelimiter`].
pub struct Requester<R: Ratelimiter> {
    client: Client,
    ratelimiter: R,
    base_url: String,
    token: Option<String>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl<R: Ratelimiter> Requester<R> {
    pub fn new(ratelimiter: R) -> Result<Self> {
        Self::from_config(ratelimiter, &RequesterConfig::default())
    }

    pub fn from_config(ratelimiter: R, config: &RequesterConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .user_agent(config.user_agent.clone().unwrap_or_else(default_user_agent))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            ratelimiter,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn ratelimiter(&self) -> &R {
        &self.ratelimiter
    }

    /// Sends the request, retrying ratelimits, server errors and transport failures.
    pub async fn request(&self, route: &Route, body: Option<&Value>) -> Result<Value> {
        let url = route.url(&self.base_url)?;
        let mut attempt = 0;

        loop {
            match self.send_once(route, &url, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = match &e {
                        WumpyError::RateLimited { retry_after, .. } => {
                            Duration::try_from_secs_f64(*retry_after).unwrap_or(self.retry_backoff)
                        }
                        _ => self.retry_backoff * attempt,
                    };
                    tracing::warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        route,
                        e,
                        attempt,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, route: &Route, url: &str, body: Option<&Value>) -> Result<Value> {
        let mut permit = self.ratelimiter.acquire(route).await?;

        let mut request = self.client.request(route.method().clone(), url);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bot {}", token));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!("Making request: {}", route);
        let response = request.send().await?;
        let status = response.status();
        let headers = to_headers(response.headers());

        if let Err(e) = permit.update(&headers).await {
            tracing::warn!("Ignoring ratelimit headers of {}: {}", route, e);
        }
        drop(permit);

        let text = response.text().await?;
        tracing::debug!("{} responded with {}", route, status);

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        let payload: Option<Value> = serde_json::from_str(&text).ok();
        let message = payload
            .as_ref()
            .and_then(|p| p.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(text);

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let info = RatelimitHeaders::parse(&headers).unwrap_or_default();
                let retry_after = payload
                    .as_ref()
                    .and_then(|p| p.get("retry_after"))
                    .and_then(Value::as_f64)
                    .or_else(|| info.retry_after.map(|d| d.as_secs_f64()))
                    .unwrap_or(1.0);
                let global = info.is_global()
                    || payload
                        .as_ref()
                        .and_then(|p| p.get("global"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                WumpyError::RateLimited {
                    retry_after,
                    global,
                }
            }
            StatusCode::UNAUTHORIZED => WumpyError::Unauthorized { message },
            StatusCode::FORBIDDEN => WumpyError::Forbidden { message },
            StatusCode::NOT_FOUND => WumpyError::NotFound { message },
            s if s.is_server_error() => WumpyError::ServerError {
                status: s.as_u16(),
                message,
            },
            s => WumpyError::HttpStatusError {
                status: s.as_u16(),
                message,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NoopRatelimiter;

    #[test]
    fn test_default_config_is_valid() {
        let config = RequesterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(default_user_agent().starts_with("DiscordBot ("));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RequesterConfig {
            base_url: "discord.com".to_string(),
            ..Default::default()
        };
        assert!(Requester::from_config(NoopRatelimiter, &config).is_err());

        let config = RequesterConfig {
            token: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RequesterConfig {
            timeout_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RequesterConfig {
            retry_backoff_ms: 120_000,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("requester.retry_backoff_ms"));

        let config = RequesterConfig {
            retry_backoff_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_missing_route_param_fails_before_sending() {
        let requester = Requester::new(NoopRatelimiter).unwrap();
        let route = Route::new(reqwest::Method::GET, "/channels/{channel_id}");
        let err = requester.request(&route, None).await.unwrap_err();
        assert!(matches!(err, WumpyError::InvalidRouteError { .. }));
    }
}
