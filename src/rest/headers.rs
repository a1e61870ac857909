use crate::domain::model::{Headers, RatelimitScope};
use crate::utils::error::{Result, WumpyError};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET: &str = "x-ratelimit-reset";
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const BUCKET: &str = "x-ratelimit-bucket";
pub const SCOPE: &str = "x-ratelimit-scope";
pub const GLOBAL: &str = "x-ratelimit-global";
pub const RETRY_AFTER: &str = "retry-after";

/// Ratelimit information carried by one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatelimitHeaders {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset: Option<DateTime<Utc>>,
    pub reset_after: Option<Duration>,
    pub bucket: Option<String>,
    pub scope: Option<RatelimitScope>,
    pub global: bool,
    pub retry_after: Option<Duration>,
}

impl RatelimitHeaders {
    pub fn parse(headers: &Headers) -> Result<Self> {
        let mut parsed = Self::default();

        for (name, value) in headers {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                LIMIT => parsed.limit = Some(parse_count(LIMIT, value)?),
                REMAINING => parsed.remaining = Some(parse_count(REMAINING, value)?),
                RESET => parsed.reset = Some(parse_reset(value)?),
                RESET_AFTER => parsed.reset_after = Some(parse_seconds(RESET_AFTER, value)?),
                BUCKET if !value.is_empty() => parsed.bucket = Some(value.to_string()),
                SCOPE if !value.is_empty() => parsed.scope = Some(RatelimitScope::parse(value)),
                GLOBAL => parsed.global = value.eq_ignore_ascii_case("true"),
                RETRY_AFTER => parsed.retry_after = Some(parse_seconds(RETRY_AFTER, value)?),
                _ => {}
            }
        }

        Ok(parsed)
    }

    pub fn from_header_map(map: &reqwest::header::HeaderMap) -> Result<Self> {
        Self::parse(&to_headers(map))
    }

    pub fn is_global(&self) -> bool {
        self.global || self.scope == Some(RatelimitScope::Global)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Time until the bucket resets, measured from `now` for the absolute header.
    pub fn reset_in(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.reset_after.or(self.retry_after).or_else(|| {
            self.reset
                .map(|reset| (reset - now).to_std().unwrap_or(Duration::ZERO))
        })
    }
}

/// Flattens a reqwest header map, skipping values that are not visible ASCII.
pub fn to_headers(map: &reqwest::header::HeaderMap) -> Headers {
    map.iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn invalid(name: &str, value: &str, reason: impl Into<String>) -> WumpyError {
    WumpyError::InvalidHeaderError {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_count(name: &str, value: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .map_err(|e| invalid(name, value, e.to_string()))
}

fn parse_seconds(name: &str, value: &str) -> Result<Duration> {
    let secs = value
        .parse::<f64>()
        .map_err(|e| invalid(name, value, e.to_string()))?;
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(name, value, e.to_string()))
}

fn parse_reset(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(secs) = value.parse::<f64>() {
        if !secs.is_finite() || secs < 0.0 {
            return Err(invalid(RESET, value, "timestamp out of range"));
        }
        return DateTime::from_timestamp_micros((secs * 1e6).round() as i64)
            .ok_or_else(|| invalid(RESET, value, "timestamp out of range"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.with_timezone(&Utc));
    }
    // Naive datetimes are taken as UTC.
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| invalid(RESET, value, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_full_set() {
        let parsed = RatelimitHeaders::parse(&headers(&[
            ("X-RateLimit-Limit", "5"),
            ("X-RateLimit-Remaining", "4"),
            ("X-RateLimit-Reset", "1470173023.123"),
            ("X-RateLimit-Reset-After", "1.25"),
            ("X-RateLimit-Bucket", "abcd1234"),
            ("X-RateLimit-Scope", "user"),
        ]))
        .unwrap();

        assert_eq!(parsed.limit, Some(5));
        assert_eq!(parsed.remaining, Some(4));
        assert_eq!(parsed.reset.unwrap().timestamp_millis(), 1470173023123);
        assert_eq!(parsed.reset_after, Some(Duration::from_millis(1250)));
        assert_eq!(parsed.bucket.as_deref(), Some("abcd1234"));
        assert_eq!(parsed.scope, Some(RatelimitScope::User));
        assert!(!parsed.is_global());
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let parsed = RatelimitHeaders::parse(&headers(&[
            ("x-ratelimit-remaining", "0"),
            ("RETRY-AFTER", "3"),
        ]))
        .unwrap();

        assert_eq!(parsed.remaining, Some(0));
        assert_eq!(parsed.retry_after, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_empty_headers() {
        let parsed = RatelimitHeaders::parse(&Headers::new()).unwrap();
        assert!(parsed.is_empty());
        assert_eq!(parsed.reset_in(Utc::now()), None);
    }

    #[test]
    fn test_reset_as_datetime_string() {
        let parsed = RatelimitHeaders::parse(&headers(&[(
            "X-RateLimit-Reset",
            "2021-06-01 12:30:15.500000+00:00",
        )]))
        .unwrap();
        let reset = parsed.reset.unwrap();
        assert_eq!(reset.timestamp(), 1622550615);
        assert_eq!(reset.timestamp_subsec_millis(), 500);

        let rfc = RatelimitHeaders::parse(&headers(&[(
            "X-RateLimit-Reset",
            "2021-06-01T14:30:15+02:00",
        )]))
        .unwrap();
        assert_eq!(rfc.reset.unwrap().timestamp(), 1622550615);
    }

    #[test]
    fn test_global_detection() {
        let by_flag =
            RatelimitHeaders::parse(&headers(&[("X-RateLimit-Global", "True")])).unwrap();
        assert!(by_flag.is_global());

        let by_scope =
            RatelimitHeaders::parse(&headers(&[("X-RateLimit-Scope", "global")])).unwrap();
        assert!(by_scope.is_global());

        let shared =
            RatelimitHeaders::parse(&headers(&[("X-RateLimit-Scope", "shared")])).unwrap();
        assert_eq!(shared.scope, Some(RatelimitScope::Shared));
        assert!(!shared.is_global());
    }

    #[test]
    fn test_reset_in_prefers_relative() {
        let now = Utc::now();
        let parsed = RatelimitHeaders {
            reset: Some(now + chrono::Duration::seconds(60)),
            reset_after: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        assert_eq!(parsed.reset_in(now), Some(Duration::from_secs(2)));

        let absolute = RatelimitHeaders {
            reset: Some(now + chrono::Duration::seconds(60)),
            ..Default::default()
        };
        assert_eq!(absolute.reset_in(now), Some(Duration::from_secs(60)));

        let past = RatelimitHeaders {
            reset: Some(now - chrono::Duration::seconds(5)),
            ..Default::default()
        };
        assert_eq!(past.reset_in(now), Some(Duration::ZERO));
    }

    #[test]
    fn test_invalid_values() {
        let err = RatelimitHeaders::parse(&headers(&[("X-RateLimit-Remaining", "lots")]))
            .unwrap_err();
        assert!(matches!(err, WumpyError::InvalidHeaderError { ref name, .. } if name == REMAINING));

        assert!(RatelimitHeaders::parse(&headers(&[("X-RateLimit-Reset-After", "-1")])).is_err());
        assert!(RatelimitHeaders::parse(&headers(&[("X-RateLimit-Reset", "tomorrow")])).is_err());
    }

    #[test]
    fn test_unknown_scope_is_kept() {
        let parsed =
            RatelimitHeaders::parse(&headers(&[("X-RateLimit-Scope", " Webhook ")])).unwrap();
        assert_eq!(parsed.scope, Some(RatelimitScope::Other("webhook".to_string())));
        assert!(!parsed.is_global());
    }

    #[test]
    fn test_negative_retry_after_is_rejected() {
        let err = RatelimitHeaders::parse(&headers(&[("Retry-After", "-0.5")])).unwrap_err();
        assert!(matches!(err, WumpyError::InvalidHeaderError { ref name, .. } if name == RETRY_AFTER));
    }

    #[test]
    fn test_unrelated_headers_ignored() {
        let parsed = RatelimitHeaders::parse(&headers(&[
            ("Content-Type", "application/json"),
            ("X-RateLimit-Bucket", ""),
        ]))
        .unwrap();
        assert!(parsed.is_empty());
    }
}
