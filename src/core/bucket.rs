use crate::rest::headers::RatelimitHeaders;
use crate::rest::route::Route;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Identifies one ratelimit bucket: the bucket hash (or the endpoint while the
/// hash is unknown) together with the route's major parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub bucket: String,
    pub major: String,
}

impl BucketKey {
    pub fn new(bucket: impl Into<String>, route: &Route) -> Self {
        Self {
            bucket: bucket.into(),
            major: route.major_params(),
        }
    }
}

#[derive(Debug, Default)]
struct BucketState {
    limit: Option<u32>,
    remaining: Option<u32>,
    reset_at: Option<Instant>,
    /// Length of the last window the server reported.
    window: Option<Duration>,
}

impl BucketState {
    fn roll_over(&mut self, now: Instant) {
        if matches!(self.reset_at, Some(reset) if reset <= now) {
            self.remaining = self.limit;
            self.reset_at = None;
        }
    }
}

#[derive(Debug, Default)]
pub struct Bucket {
    state: Mutex<BucketState>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until a request may be made and consumes it from `remaining`.
    pub async fn acquire(&self) {
        loop {
            let wait_until = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.roll_over(now);

                match (state.remaining, state.reset_at) {
                    (Some(0), Some(reset)) => Some(reset),
                    (Some(0), None) => {
                        // Only a server-reported zero gets here; learn again from the next response.
                        state.remaining = None;
                        None
                    }
                    (Some(n), reset_at) => {
                        state.remaining = Some(n - 1);
                        // A rolled-over window restarts with its first request.
                        if reset_at.is_none() {
                            state.reset_at = state.window.map(|window| now + window);
                        }
                        None
                    }
                    (None, _) => None,
                }
            };

            match wait_until {
                Some(reset) => {
                    tracing::debug!(
                        "Bucket exhausted, waiting {:?} for reset",
                        reset.saturating_duration_since(Instant::now())
                    );
                    sleep_until(reset).await;
                }
                None => return,
            }
        }
    }

    pub async fn update(&self, info: &RatelimitHeaders, reset_in: Option<Duration>) {
        let mut state = self.state.lock().await;

        if info.limit.is_some() {
            state.limit = info.limit;
        }
        if info.remaining.is_some() {
            state.remaining = info.remaining;
        }
        if let Some(reset_in) = reset_in {
            state.reset_at = Some(Instant::now() + reset_in);
            state.window = Some(reset_in);
        }
    }

    /// True when the bucket holds no pending reset. Busy buckets are never stale.
    pub fn is_stale(&self) -> bool {
        match self.state.try_lock() {
            Ok(mut state) => {
                state.roll_over(Instant::now());
                state.reset_at.is_none()
            }
            Err(_) => false,
        }
    }
}
