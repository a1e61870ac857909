use crate::domain::model::Headers;
use crate::domain::ports::{RatelimitPermit, Ratelimiter};
use crate::rest::route::Route;
use crate::utils::error::Result;
use async_trait::async_trait;

/// A ratelimiter that never waits. Handy in front of mock servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRatelimiter;

struct NoopPermit;

#[async_trait]
impl Ratelimiter for NoopRatelimiter {
    async fn acquire(&self, _route: &Route) -> Result<Box<dyn RatelimitPermit>> {
        Ok(Box::new(NoopPermit))
    }
}

#[async_trait]
impl RatelimitPermit for NoopPermit {
    async fn update(&mut self, _headers: &Headers) -> Result<()> {
        Ok(())
    }
}
