//! Conformance suite for [`Ratelimiter`] implementations.
//!
//! Every case builds a fresh limiter from the factory, opens it, drives a few
//! requests with handcrafted Discord headers and closes it again. Whether a
//! request was limited is decided by timing: the suite works in multiples of
//! a time `unit`, resets lie several units in the future and a request that
//! does not get through within a shorter number of units counts as limited.

use crate::domain::model::Headers;
use crate::domain::ports::Ratelimiter;
use crate::rest::route::Route;
use crate::utils::error::{Result, WumpyError};
use chrono::Utc;
use reqwest::Method;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

pub const DEFAULT_UNIT: Duration = Duration::from_millis(50);

pub const CASES: [&str; 7] = [
    "no_headers",
    "no_more",
    "same_endpoint_major_params",
    "same_bucket_major_params",
    "global_limit",
    "limit_lifts_after_reset",
    "bucket_matrix",
];

const CHANNEL_ID: u64 = 41771983423143937;
const OTHER_CHANNEL_ID: u64 = 155101607195836416;
const BUCKET: &str = "abc123xyz789abc123xyz789";
const OTHER_BUCKET: &str = "xyz789abc123xyz789abc123";

/// One combination of bucket, endpoint and major parameters for two
/// consecutive requests, with whether the second one has to be limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketCase {
    pub name: &'static str,
    /// `None` sends no bucket header, otherwise whether both share the hash.
    pub same_bucket: Option<bool>,
    pub same_endpoint: bool,
    pub same_major: bool,
    pub limited: bool,
}

const fn case(
    name: &'static str,
    same_bucket: Option<bool>,
    same_endpoint: bool,
    same_major: bool,
    limited: bool,
) -> BucketCase {
    BucketCase {
        name,
        same_bucket,
        same_endpoint,
        same_major,
        limited,
    }
}

// The second request can only be held back when it resolves to the first
// request's bucket before any response told the limiter otherwise.
pub const BUCKET_CASES: [BucketCase; 11] = [
    case("same_bucket_same_endpoint_same_major", Some(true), true, true, true),
    case("diff_bucket_same_endpoint_same_major", Some(false), true, true, true),
    case("same_bucket_diff_endpoint_same_major", Some(true), false, true, false),
    case("same_bucket_same_endpoint_diff_major", Some(true), true, false, false),
    case("diff_bucket_diff_endpoint_same_major", Some(false), false, true, false),
    case("same_bucket_diff_endpoint_diff_major", Some(true), false, false, false),
    case("diff_bucket_same_endpoint_diff_major", Some(false), true, false, false),
    case("diff_bucket_diff_endpoint_diff_major", Some(false), false, false, false),
    case("no_bucket_same_endpoint_same_major", None, true, true, true),
    case("no_bucket_diff_endpoint_same_major", None, false, true, false),
    case("no_bucket_same_endpoint_diff_major", None, true, false, false),
];

#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub unit_ms: u128,
    pub results: Vec<CaseResult>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Runs the conformance cases against limiters produced by `factory`.
pub struct RatelimiterSuite<R, F> {
    factory: F,
    unit: Duration,
    _limiter: PhantomData<fn() -> R>,
}

impl<R, F> RatelimiterSuite<R, F>
where
    R: Ratelimiter,
    F: Fn() -> R,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            unit: DEFAULT_UNIT,
            _limiter: PhantomData,
        }
    }

    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn unit(&self) -> Duration {
        self.unit
    }

    /// Entering the limiter without ever getting headers must work.
    pub async fn no_headers(&self) -> Result<()> {
        self.run_case("no_headers", |limiter| async move {
            enter(&*limiter, &Route::new(Method::GET, "/gateway"), &Headers::new()).await
        })
        .await
    }

    pub async fn no_more(&self) -> Result<()> {
        let unit = self.unit;
        self.run_case("no_more", |limiter| async move {
            let route = Route::new(Method::GET, "/gateway");
            enter(&*limiter, &route, &exhausted(unit * 6, false)).await?;

            let mut second = exhausted(unit * 6, false);
            second.insert("X-RateLimit-Scope".to_string(), "user".to_string());
            let limited = is_limited(&*limiter, &route, &second, unit * 2).await?;

            ensure(
                limited,
                "no_more",
                "Ratelimiter did not limit request to same endpoint with no remaining requests left",
            )
        })
        .await
    }

    pub async fn same_endpoint_major_params(&self) -> Result<()> {
        let unit = self.unit;
        self.run_case("same_endpoint_major_params", |limiter| async move {
            let messages = |channel: u64| {
                Route::new(Method::POST, "/channels/{channel_id}/messages")
                    .with_param("channel_id", channel)
            };
            enter(&*limiter, &messages(CHANNEL_ID), &exhausted(unit * 6, false)).await?;

            let mut second = exhausted(unit * 6, false);
            second.insert("X-RateLimit-Scope".to_string(), "user".to_string());
            let limited =
                is_limited(&*limiter, &messages(OTHER_CHANNEL_ID), &second, unit * 2).await?;

            ensure(
                !limited,
                "same_endpoint_major_params",
                "Ratelimiter limited request to the same endpoint but with differing major parameters (channel_id)",
            )
        })
        .await
    }

    pub async fn same_bucket_major_params(&self) -> Result<()> {
        let unit = self.unit;
        self.run_case("same_bucket_major_params", |limiter| async move {
            let channel = Route::new(Method::GET, "/channels/{channel_id}")
                .with_param("channel_id", CHANNEL_ID);
            let invites = Route::new(Method::POST, "/channels/{channel_id}/invites")
                .with_param("channel_id", CHANNEL_ID);
            let reset = unit * 8;

            let mut first = ratelimit_headers(None, 1, reset, false);
            first.insert("X-RateLimit-Bucket".to_string(), BUCKET.to_string());
            enter(&*limiter, &channel, &first).await?;

            let mut second = ratelimit_headers(None, 0, reset, false);
            second.insert("X-RateLimit-Bucket".to_string(), BUCKET.to_string());
            enter(&*limiter, &invites, &second).await?;

            let mut third = second.clone();
            third.insert("X-RateLimit-Scope".to_string(), "user".to_string());
            let limited = is_limited(&*limiter, &channel, &third, unit * 2).await?;

            ensure(
                limited,
                "same_bucket_major_params",
                "Ratelimiter did not limit request to different endpoint but same bucket with same major parameters (channel_id)",
            )
        })
        .await
    }

    /// A global ratelimit holds back requests to every route.
    pub async fn global_limit(&self) -> Result<()> {
        let unit = self.unit;
        self.run_case("global_limit", |limiter| async move {
            let retry_after = format_seconds(unit * 6);
            let headers: Headers = [
                ("X-RateLimit-Global", "true"),
                ("X-RateLimit-Scope", "global"),
                ("Retry-After", retry_after.as_str()),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
            enter(&*limiter, &Route::new(Method::GET, "/gateway"), &headers).await?;

            let unrelated = Route::new(Method::GET, "/users/@me");
            let limited = is_limited(&*limiter, &unrelated, &Headers::new(), unit * 2).await?;

            ensure(
                limited,
                "global_limit",
                "Ratelimiter did not hold back an unrelated request during a global ratelimit",
            )
        })
        .await
    }

    /// Once the reset passes, the bucket has to admit requests again.
    pub async fn limit_lifts_after_reset(&self) -> Result<()> {
        let unit = self.unit;
        self.run_case("limit_lifts_after_reset", |limiter| async move {
            let route = Route::new(Method::GET, "/gateway");
            enter(&*limiter, &route, &exhausted(unit, false)).await?;

            let limited = is_limited(&*limiter, &route, &Headers::new(), unit * 4).await?;

            ensure(
                !limited,
                "limit_lifts_after_reset",
                "Ratelimiter kept limiting the endpoint after its bucket reset",
            )
        })
        .await
    }

    /// Make two ratelimited requests, each with extra response headers.
    ///
    /// The first request reports that no requests remain. The second one is
    /// given three units to get through. Returns whether it was limited.
    pub async fn run_two_requests(
        &self,
        first: (Route, Headers),
        second: (Route, Headers),
    ) -> Result<bool> {
        let unit = self.unit;
        self.run_case("run_two_requests", |limiter| async move {
            let mut first_headers = exhausted(unit * 6, true);
            first_headers.extend(first.1);
            enter(&*limiter, &first.0, &first_headers).await?;

            let mut second_headers = exhausted(unit * 6, true);
            second_headers.insert("X-RateLimit-Scope".to_string(), "user".to_string());
            second_headers.extend(second.1);
            is_limited(&*limiter, &second.0, &second_headers, unit * 3).await
        })
        .await
    }

    pub async fn bucket_case(&self, case: &BucketCase) -> Result<()> {
        let first_route = Route::new(Method::GET, "/channels/{channel_id}")
            .with_param("channel_id", CHANNEL_ID);

        let second_route = if case.same_endpoint {
            Route::new(Method::GET, "/channels/{channel_id}")
        } else {
            Route::new(Method::POST, "/channels/{channel_id}/messages")
        };
        let second_route = second_route.with_param(
            "channel_id",
            if case.same_major { CHANNEL_ID } else { OTHER_CHANNEL_ID },
        );

        let mut first_headers = Headers::new();
        let mut second_headers = Headers::new();
        if let Some(same) = case.same_bucket {
            first_headers.insert("X-RateLimit-Bucket".to_string(), BUCKET.to_string());
            let other = if same { BUCKET } else { OTHER_BUCKET };
            second_headers.insert("X-RateLimit-Bucket".to_string(), other.to_string());
        }

        let limited = self
            .run_two_requests((first_route, first_headers), (second_route, second_headers))
            .await
            .map_err(|e| match e {
                WumpyError::SuiteFailure { message, .. } => WumpyError::SuiteFailure {
                    case: case.name.to_string(),
                    message,
                },
                other => other,
            })?;

        if limited != case.limited {
            return Err(WumpyError::SuiteFailure {
                case: case.name.to_string(),
                message: format!(
                    "expected the second request to {}be limited",
                    if case.limited { "" } else { "not " }
                ),
            });
        }
        Ok(())
    }

    pub async fn bucket_matrix(&self) -> Result<()> {
        let mut failures = Vec::new();
        for case in &BUCKET_CASES {
            if let Err(e) = self.bucket_case(case).await {
                tracing::debug!("Bucket case failed: {}", e);
                failures.push(match e {
                    WumpyError::SuiteFailure { case, message } => format!("{}: {}", case, message),
                    other => other.to_string(),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(WumpyError::SuiteFailure {
                case: "bucket_matrix".to_string(),
                message: failures.join("; "),
            })
        }
    }

    pub async fn run_named(&self, name: &str) -> Result<()> {
        match name {
            "no_headers" => self.no_headers().await,
            "no_more" => self.no_more().await,
            "same_endpoint_major_params" => self.same_endpoint_major_params().await,
            "same_bucket_major_params" => self.same_bucket_major_params().await,
            "global_limit" => self.global_limit().await,
            "limit_lifts_after_reset" => self.limit_lifts_after_reset().await,
            "bucket_matrix" => self.bucket_matrix().await,
            other => Err(WumpyError::InvalidConfigValueError {
                field: "case".to_string(),
                value: other.to_string(),
                reason: format!("Unknown case. Valid cases: {}", CASES.join(", ")),
            }),
        }
    }

    pub async fn run_all(&self) -> SuiteReport {
        let mut results = Vec::with_capacity(CASES.len());
        for name in CASES {
            results.push(self.record(name).await);
        }
        self.report(results)
    }

    /// Runs only the named cases, rejecting unknown names before running any.
    pub async fn run_selected(&self, names: &[String]) -> Result<SuiteReport> {
        crate::utils::validation::validate_one_of("cases", names, &CASES)?;

        let mut results = Vec::with_capacity(names.len());
        for name in names {
            results.push(self.record(name).await);
        }
        Ok(self.report(results))
    }

    async fn record(&self, name: &str) -> CaseResult {
        let start = Instant::now();
        let outcome = self.run_named(name).await;
        let elapsed_ms = start.elapsed().as_millis();

        match outcome {
            Ok(()) => {
                tracing::info!("✅ {} ({}ms)", name, elapsed_ms);
                CaseResult {
                    name: name.to_string(),
                    passed: true,
                    message: None,
                    elapsed_ms,
                }
            }
            Err(e) => {
                tracing::error!("❌ {}: {}", name, e);
                let message = match e {
                    WumpyError::SuiteFailure { message, .. } => message,
                    other => other.to_string(),
                };
                CaseResult {
                    name: name.to_string(),
                    passed: false,
                    message: Some(message),
                    elapsed_ms,
                }
            }
        }
    }

    fn report(&self, results: Vec<CaseResult>) -> SuiteReport {
        SuiteReport {
            unit_ms: self.unit.as_millis(),
            results,
        }
    }

    /// Opens a fresh limiter, runs `body` and closes the limiter whatever
    /// the outcome. Errors raised by the limiter become failures of `case`.
    async fn run_case<T, B, Fut>(&self, case: &str, body: B) -> Result<T>
    where
        B: FnOnce(Arc<R>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let limiter = Arc::new((self.factory)());
        limiter.open().await.map_err(|e| rename_failure(e, case))?;

        let outcome = body(Arc::clone(&limiter)).await;
        let closed = limiter.close().await;

        let value = outcome.map_err(|e| rename_failure(e, case))?;
        closed.map_err(|e| rename_failure(e, case))?;
        Ok(value)
    }
}

fn rename_failure(err: WumpyError, case: &str) -> WumpyError {
    match err {
        WumpyError::SuiteFailure { .. } => err,
        other => WumpyError::SuiteFailure {
            case: case.to_string(),
            message: format!("ratelimiter returned an error: {}", other),
        },
    }
}

fn ensure(condition: bool, case: &str, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(WumpyError::SuiteFailure {
            case: case.to_string(),
            message: message.to_string(),
        })
    }
}

async fn enter<R: Ratelimiter + ?Sized>(limiter: &R, route: &Route, headers: &Headers) -> Result<()> {
    let mut permit = limiter.acquire(route).await?;
    permit.update(headers).await
}

async fn is_limited<R: Ratelimiter + ?Sized>(
    limiter: &R,
    route: &Route,
    headers: &Headers,
    within: Duration,
) -> Result<bool> {
    match timeout(within, enter(limiter, route, headers)).await {
        Ok(entered) => entered.map(|()| false),
        Err(_) => Ok(true),
    }
}

/// Limit 1 and nothing remaining.
fn exhausted(reset_after: Duration, reset_as_datetime: bool) -> Headers {
    ratelimit_headers(Some(1), 0, reset_after, reset_as_datetime)
}

/// Headers of a response whose bucket resets `reset_after` from now. The
/// absolute reset is either a Unix timestamp or a datetime string.
pub fn ratelimit_headers(
    limit: Option<u32>,
    remaining: u32,
    reset_after: Duration,
    reset_as_datetime: bool,
) -> Headers {
    let reset_at = Utc::now()
        + chrono::Duration::from_std(reset_after).unwrap_or_else(|_| chrono::Duration::zero());
    let reset = if reset_as_datetime {
        reset_at.format("%Y-%m-%d %H:%M:%S%.6f%:z").to_string()
    } else {
        format!("{:.6}", reset_at.timestamp_micros() as f64 / 1e6)
    };

    let mut headers = Headers::new();
    if let Some(limit) = limit {
        headers.insert("X-RateLimit-Limit".to_string(), limit.to_string());
    }
    headers.insert("X-RateLimit-Remaining".to_string(), remaining.to_string());
    headers.insert("X-RateLimit-Reset".to_string(), reset);
    headers.insert("X-RateLimit-Reset-After".to_string(), format_seconds(reset_after));
    headers
}

fn format_seconds(duration: Duration) -> String {
    format!("{:.6}", duration.as_secs_f64())
}
