use crate::domain::model::Headers;
use crate::rest::route::Route;
use crate::utils::error::Result;
use async_trait::async_trait;

/// A Discord REST ratelimiter.
///
/// `open` and `close` bracket the lifetime of the limiter. Between them every
/// request first calls [`Ratelimiter::acquire`], which waits until the route
/// may be requested, and then reports the response headers back through the
/// returned permit. Dropping the permit releases it.
#[async_trait]
pub trait Ratelimiter: Send + Sync {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn acquire(&self, route: &Route) -> Result<Box<dyn RatelimitPermit>>;
}

#[async_trait]
pub trait RatelimitPermit: Send {
    /// Feed back the headers of the response. An empty map is valid.
    async fn update(&mut self, headers: &Headers) -> Result<()>;
}
