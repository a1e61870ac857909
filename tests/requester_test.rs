use anyhow::Result;
use httpmock::prelude::*;
use reqwest::Method;
use serde_json::json;
use std::time::{Duration, Instant};
use wumpy_testing::{
    DictRatelimiter, NoopRatelimiter, Requester, RequesterConfig, Route, WumpyError,
};

fn config(server: &MockServer, max_retries: u32) -> RequesterConfig {
    RequesterConfig {
        base_url: server.url("/api/v10"),
        token: Some("bot-token".to_string()),
        max_retries,
        retry_backoff_ms: 0,
        ..Default::default()
    }
}

fn channel(id: u64) -> Route {
    Route::new(Method::GET, "/channels/{channel_id}").with_param("channel_id", id)
}

#[tokio::test]
async fn test_get_returns_json_and_sends_token() -> Result<()> {
    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v10/channels/41771983423143937")
            .header("Authorization", "Bot bot-token");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(json!({"id": "41771983423143937", "name": "general"}));
    });

    let requester = Requester::from_config(NoopRatelimiter, &config(&server, 0))?;
    let value = requester.request(&channel(41771983423143937), None).await?;

    api_mock.assert();
    assert_eq!(value["name"], "general");
    Ok(())
}

#[tokio::test]
async fn test_post_body_and_empty_response() -> Result<()> {
    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v10/channels/1/typing")
            .json_body(json!({"reason": "testing"}));
        then.status(204);
    });

    let requester = Requester::from_config(NoopRatelimiter, &config(&server, 0))?;
    let route = Route::new(Method::POST, "/channels/{channel_id}/typing").with_param("channel_id", 1);
    let value = requester
        .request(&route, Some(&json!({"reason": "testing"})))
        .await?;

    api_mock.assert();
    assert!(value.is_null());
    Ok(())
}

#[tokio::test]
async fn test_not_found_is_not_retried() -> Result<()> {
    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET).path("/api/v10/channels/2");
        then.status(404)
            .json_body(json!({"message": "Unknown Channel", "code": 10003}));
    });

    let requester = Requester::from_config(NoopRatelimiter, &config(&server, 3))?;
    let err = requester.request(&channel(2), None).await.unwrap_err();

    api_mock.assert_hits(1);
    match err {
        WumpyError::NotFound { message } => assert_eq!(message, "Unknown Channel"),
        other => panic!("expected NotFound, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_server_errors_are_retried() -> Result<()> {
    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET).path("/api/v10/channels/3");
        then.status(502).body("Bad Gateway");
    });

    let requester = Requester::from_config(NoopRatelimiter, &config(&server, 2))?;
    let err = requester.request(&channel(3), None).await.unwrap_err();

    api_mock.assert_hits(3);
    assert!(matches!(err, WumpyError::ServerError { status: 502, .. }));
    Ok(())
}

#[tokio::test]
async fn test_too_many_requests_gives_up_after_retries() -> Result<()> {
    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET).path("/api/v10/channels/4");
        then.status(429)
            .header("Retry-After", "0.01")
            .header("X-RateLimit-Scope", "shared")
            .json_body(json!({"message": "You are being rate limited.", "retry_after": 0.01, "global": false}));
    });

    let requester = Requester::from_config(NoopRatelimiter, &config(&server, 1))?;
    let err = requester.request(&channel(4), None).await.unwrap_err();

    api_mock.assert_hits(2);
    match err {
        WumpyError::RateLimited { retry_after, global } => {
            assert!((retry_after - 0.01).abs() < f64::EPSILON);
            assert!(!global);
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_dict_ratelimiter_waits_for_reset() -> Result<()> {
    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET).path("/api/v10/channels/5");
        then.status(200)
            .header("X-RateLimit-Limit", "1")
            .header("X-RateLimit-Remaining", "0")
            .header("X-RateLimit-Reset-After", "0.3")
            .header("X-RateLimit-Bucket", "channel-bucket")
            .json_body(json!({"id": "5"}));
    });

    let requester = Requester::from_config(DictRatelimiter::new(), &config(&server, 0))?;

    let start = Instant::now();
    requester.request(&channel(5), None).await?;
    let first = start.elapsed();
    requester.request(&channel(5), None).await?;

    api_mock.assert_hits(2);
    assert!(start.elapsed() >= first + Duration::from_millis(250));
    assert_eq!(
        requester.ratelimiter().bucket_hash(&channel(5)).await.as_deref(),
        Some("channel-bucket")
    );
    Ok(())
}

#[tokio::test]
async fn test_client_errors_map_to_typed_errors() -> Result<()> {
    let server = MockServer::start();
    let cases = [
        (401, "401: Unauthorized"),
        (403, "Missing Permissions"),
        (400, "Invalid Form Body"),
    ];
    let mocks: Vec<_> = cases
        .iter()
        .map(|(status, message)| {
            server.mock(|when, then| {
                when.method(GET).path(format!("/api/v10/channels/{}", status));
                then.status(*status)
                    .json_body(json!({"message": message, "code": 0}));
            })
        })
        .collect();

    let requester = Requester::from_config(NoopRatelimiter, &config(&server, 3))?;

    let unauthorized = requester.request(&channel(401), None).await.unwrap_err();
    assert!(
        matches!(unauthorized, WumpyError::Unauthorized { ref message } if message == "401: Unauthorized")
    );

    let forbidden = requester.request(&channel(403), None).await.unwrap_err();
    assert!(matches!(forbidden, WumpyError::Forbidden { ref message } if message == "Missing Permissions"));

    let bad_request = requester.request(&channel(400), None).await.unwrap_err();
    assert!(matches!(
        bad_request,
        WumpyError::HttpStatusError { status: 400, ref message } if message == "Invalid Form Body"
    ));

    for mock in &mocks {
        mock.assert_hits(1);
    }
    Ok(())
}

#[tokio::test]
async fn test_global_ratelimit_is_reported() -> Result<()> {
    let server = MockServer::start();
    let by_header = server.mock(|when, then| {
        when.method(GET).path("/api/v10/channels/6");
        then.status(429)
            .header("X-RateLimit-Global", "true")
            .header("Retry-After", "2")
            .body("");
    });
    let by_body = server.mock(|when, then| {
        when.method(GET).path("/api/v10/channels/7");
        then.status(429)
            .json_body(json!({"message": "You are being rate limited.", "retry_after": 0.5, "global": true}));
    });

    let requester = Requester::from_config(NoopRatelimiter, &config(&server, 0))?;

    match requester.request(&channel(6), None).await.unwrap_err() {
        WumpyError::RateLimited { retry_after, global } => {
            assert!(global);
            assert!((retry_after - 2.0).abs() < f64::EPSILON);
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
    match requester.request(&channel(7), None).await.unwrap_err() {
        WumpyError::RateLimited { retry_after, global } => {
            assert!(global);
            assert!((retry_after - 0.5).abs() < f64::EPSILON);
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }

    by_header.assert_hits(1);
    by_body.assert_hits(1);
    Ok(())
}

#[tokio::test]
async fn test_refused_connection_is_retried() -> Result<()> {
    // Bind and release a port so nothing listens on it.
    let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();

    let config = RequesterConfig {
        base_url: format!("http://127.0.0.1:{}/api/v10", port),
        max_retries: 2,
        retry_backoff_ms: 50,
        ..Default::default()
    };
    let requester = Requester::from_config(NoopRatelimiter, &config)?;

    let start = Instant::now();
    let err = requester.request(&channel(8), None).await.unwrap_err();

    // Two retries wait 50ms and 100ms.
    assert!(start.elapsed() >= Duration::from_millis(150));
    match err {
        WumpyError::HttpError(e) => assert!(e.is_connect()),
        other => panic!("expected HttpError, got {:?}", other),
    }
    Ok(())
}
