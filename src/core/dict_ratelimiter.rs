use crate::core::bucket::{Bucket, BucketKey};
use crate::domain::model::{Headers, RatelimitScope};
use crate::domain::ports::{RatelimitPermit, Ratelimiter};
use crate::rest::headers::RatelimitHeaders;
use crate::rest::route::Route;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// In-memory ratelimiter keeping one [`Bucket`] per bucket hash and major
/// parameters, plus the global lock.
pub struct DictRatelimiter {
    shared: Arc<Shared>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    sweep_interval: Duration,
}

#[derive(Default)]
struct Shared {
    /// Endpoint to the bucket hash Discord reported for it.
    hashes: Mutex<HashMap<String, String>>,
    buckets: Mutex<HashMap<BucketKey, Arc<Bucket>>>,
    global_until: Mutex<Option<Instant>>,
}

impl DictRatelimiter {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            sweeper: Mutex::new(None),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub async fn bucket_count(&self) -> usize {
        self.shared.buckets.lock().await.len()
    }

    /// The bucket hash learned for the route's endpoint, if any.
    pub async fn bucket_hash(&self, route: &Route) -> Option<String> {
        self.shared.hashes.lock().await.get(&route.endpoint()).cloned()
    }
}

impl Default for DictRatelimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DictRatelimiter {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

impl Shared {
    async fn key_for(&self, route: &Route) -> BucketKey {
        let endpoint = route.endpoint();
        let hashes = self.hashes.lock().await;
        match hashes.get(&endpoint) {
            Some(hash) => BucketKey::new(hash.clone(), route),
            None => BucketKey::new(endpoint, route),
        }
    }

    async fn bucket(&self, key: BucketKey) -> Arc<Bucket> {
        let mut buckets = self.buckets.lock().await;
        buckets.entry(key).or_default().clone()
    }

    async fn wait_global(&self) {
        loop {
            let until = {
                let mut global = self.global_until.lock().await;
                match *global {
                    Some(until) if until > Instant::now() => until,
                    _ => {
                        *global = None;
                        return;
                    }
                }
            };
            sleep_until(until).await;
        }
    }

    async fn lock_global(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut global = self.global_until.lock().await;
        if global.map_or(true, |current| current < until) {
            *global = Some(until);
        }
    }

    /// Records the bucket hash of the route's endpoint and returns the bucket
    /// updates should go to. The permit's bucket moves from its previous key
    /// to the hash unless another endpoint already registered one there.
    async fn migrate(&self, route: &Route, hash: &str, current: &Arc<Bucket>) -> Arc<Bucket> {
        let endpoint = route.endpoint();
        let (old_key, still_shared) = {
            let mut hashes = self.hashes.lock().await;
            let previous = hashes.insert(endpoint.clone(), hash.to_string());
            if previous.as_deref() != Some(hash) {
                tracing::debug!("Endpoint '{}' belongs to bucket {}", endpoint, hash);
            }
            match previous {
                Some(old) => {
                    let shared = hashes.values().any(|h| *h == old);
                    (BucketKey::new(old, route), shared)
                }
                None => (BucketKey::new(endpoint, route), false),
            }
        };

        let new_key = BucketKey::new(hash, route);
        let mut buckets = self.buckets.lock().await;
        let owned = matches!(buckets.get(&old_key), Some(bucket) if Arc::ptr_eq(bucket, current));
        if old_key != new_key && !still_shared && owned {
            buckets.remove(&old_key);
        }
        buckets
            .entry(new_key)
            .or_insert_with(|| current.clone())
            .clone()
    }

    async fn sweep(&self) {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| Arc::strong_count(bucket) > 1 || !bucket.is_stale());

        let removed = before - buckets.len();
        if removed > 0 {
            tracing::debug!("Swept {} idle buckets, {} left", removed, buckets.len());
        }
    }
}

#[async_trait]
impl Ratelimiter for DictRatelimiter {
    async fn open(&self) -> Result<()> {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let period = self.sweep_interval;
        *sweeper = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                shared.sweep().await;
            }
        }));

        tracing::info!("Ratelimiter opened (sweep every {:?})", period);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let handle = self.sweeper.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            // The only possible error is the cancellation we just caused.
            let _ = handle.await;
            tracing::info!("Ratelimiter closed");
        }
        Ok(())
    }

    async fn acquire(&self, route: &Route) -> Result<Box<dyn RatelimitPermit>> {
        self.shared.wait_global().await;

        let key = self.shared.key_for(route).await;
        let bucket = self.shared.bucket(key).await;
        bucket.acquire().await;

        Ok(Box::new(DictPermit {
            shared: Arc::clone(&self.shared),
            route: route.clone(),
            bucket,
        }))
    }
}

struct DictPermit {
    shared: Arc<Shared>,
    route: Route,
    bucket: Arc<Bucket>,
}

#[async_trait]
impl RatelimitPermit for DictPermit {
    async fn update(&mut self, headers: &Headers) -> Result<()> {
        let info = RatelimitHeaders::parse(headers)?;
        if info.is_empty() {
            return Ok(());
        }

        let reset_in = info.reset_in(Utc::now());

        if info.is_global() {
            let retry = info.retry_after.or(reset_in).unwrap_or(Duration::ZERO);
            tracing::warn!("Global ratelimit hit on {}, pausing all requests for {:?}", self.route, retry);
            self.shared.lock_global(retry).await;
        } else if matches!(info.scope, Some(RatelimitScope::User | RatelimitScope::Shared)) {
            tracing::warn!(
                "Ratelimited on {} ({:?} scope), reset in {:?}",
                self.route,
                info.scope,
                reset_in
            );
        }

        if let Some(hash) = &info.bucket {
            self.bucket = self.shared.migrate(&self.route, hash, &self.bucket).await;
        }
        self.bucket.update(&info, reset_in).await;

        Ok(())
    }
}
