pub mod config;
pub mod core;
pub mod domain;
pub mod rest;
pub mod suites;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::TomlConfig;
pub use core::{DictRatelimiter, NoopRatelimiter};
pub use domain::model::{Headers, RatelimitScope};
pub use domain::ports::{RatelimitPermit, Ratelimiter};
pub use rest::{RatelimitHeaders, Requester, RequesterConfig, Route};
pub use suites::{RatelimiterSuite, SuiteReport};
pub use utils::error::{Result, WumpyError};
