pub mod ratelimiter;

pub use ratelimiter::{BucketCase, CaseResult, RatelimiterSuite, SuiteReport, BUCKET_CASES, CASES};

/// Generates a module with one `#[tokio::test]` per ratelimiter suite case.
///
/// ```ignore
/// use wumpy_testing::core::DictRatelimiter;
///
/// wumpy_testing::ratelimiter_suite!(dict_ratelimiter, DictRatelimiter::new);
/// wumpy_testing::ratelimiter_suite!(slow_limiter, || MyLimiter::new(), unit = Duration::from_millis(200));
/// ```
///
/// The factory is evaluated inside the generated module, which imports
/// everything from the enclosing one. The calling crate needs `tokio` with the
/// `macros` and `rt` features.
#[macro_export]
macro_rules! ratelimiter_suite {
    (@cases $factory:expr, $unit:expr, $($case:ident),+) => {
        $(
            #[::tokio::test]
            async fn $case() {
                let suite = $crate::suites::RatelimiterSuite::new($factory).with_unit($unit);
                if let Err(e) = suite.$case().await {
                    panic!("{}", e);
                }
            }
        )+
    };
    ($name:ident, $factory:expr, unit = $unit:expr) => {
        mod $name {
            #[allow(unused_imports)]
            use super::*;

            $crate::ratelimiter_suite!(
                @cases $factory,
                $unit,
                no_headers,
                no_more,
                same_endpoint_major_params,
                same_bucket_major_params,
                global_limit,
                limit_lifts_after_reset,
                bucket_matrix
            );
        }
    };
    ($name:ident, $factory:expr) => {
        $crate::ratelimiter_suite!(
            $name,
            $factory,
            unit = $crate::suites::ratelimiter::DEFAULT_UNIT
        );
    };
}
