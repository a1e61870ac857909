pub mod headers;
pub mod requester;
pub mod route;

pub use headers::RatelimitHeaders;
pub use requester::{Requester, RequesterConfig};
pub use route::Route;
