use clap::Parser;
use reqwest::Method;
use wumpy_testing::config::Command;
use wumpy_testing::utils::error::ErrorSeverity;
use wumpy_testing::utils::{logger, validation::Validate};
use wumpy_testing::{
    CliConfig, DictRatelimiter, Ratelimiter, RatelimiterSuite, Requester, Route, SuiteReport,
    TomlConfig, WumpyError,
};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    if cli.json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting wumpy-testing");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match cli.validate().and_then(|_| cli.resolve()) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };

    let outcome = match &cli.command {
        Command::Suite { .. } => run_suite(&config, cli.json).await,
        Command::Get { path, params, .. } => run_get(&config, path, params, cli.json).await,
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => exit_with(&e),
    }
}

async fn run_suite(config: &TomlConfig, json: bool) -> Result<bool, WumpyError> {
    let suite = RatelimiterSuite::new(DictRatelimiter::new).with_unit(config.suite.unit());
    tracing::info!("🔍 Running ratelimiter suite (unit {:?})", suite.unit());

    let report = match &config.suite.cases {
        Some(cases) => suite.run_selected(cases).await?,
        None => suite.run_all().await,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.passed())
}

fn print_report(report: &SuiteReport) {
    for result in &report.results {
        match &result.message {
            None => println!("✅ {} ({}ms)", result.name, result.elapsed_ms),
            Some(message) => println!("❌ {} ({}ms): {}", result.name, result.elapsed_ms, message),
        }
    }

    let failed = report.failures().count();
    println!(
        "{} passed, {} failed",
        report.results.len() - failed,
        failed
    );
}

async fn run_get(
    config: &TomlConfig,
    path: &str,
    params: &[(String, String)],
    json: bool,
) -> Result<bool, WumpyError> {
    let route = params
        .iter()
        .fold(Route::new(Method::GET, path), |route, (name, value)| {
            route.with_param(name.as_str(), value)
        });

    let requester = Requester::from_config(DictRatelimiter::new(), &config.requester)?;
    requester.ratelimiter().open().await?;
    let outcome = requester.request(&route, None).await;
    requester.ratelimiter().close().await?;
    let value = outcome?;

    if json {
        println!("{}", serde_json::to_string(&value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(true)
}

fn exit_with(e: &WumpyError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}
