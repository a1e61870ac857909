pub mod bucket;
pub mod dict_ratelimiter;
pub mod noop;

pub use crate::domain::model::Headers;
pub use crate::domain::ports::{RatelimitPermit, Ratelimiter};
pub use crate::utils::error::Result;
pub use dict_ratelimiter::DictRatelimiter;
pub use noop::NoopRatelimiter;
