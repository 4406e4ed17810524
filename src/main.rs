//! ODHARNESS: batch validation harness for orbit determination.
//!
//! Entry point. Initialises structured logging, loads configuration,
//! connects to the engine, and runs simulate → estimate → validate over
//! every scenario under the data directory. Any failure ends the run.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use odharness::config::{self, HarnessConfig};
use odharness::engine::http::HttpEngine;
use odharness::engine::runner::Harness;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    println!("run_tests start : {}", timestamp());

    let config_path = std::env::var("ODH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config::default_config_path());
    let mut cfg = HarnessConfig::load_or_default(&config_path)?;
    cfg.apply_env_overrides();

    info!(
        data_dir = %cfg.harness.data_dir.display(),
        engine = %cfg.engine.base_url,
        filters = ?cfg.harness.filters,
        batch_timeout_secs = ?cfg.harness.batch_timeout_secs,
        "ODHARNESS starting up"
    );

    let engine = HttpEngine::new(&cfg.engine.base_url, cfg.request_timeout())?;
    let harness = Harness::new(Arc::new(engine), cfg);

    let report = harness.run().await?;
    for verdict in &report.verdicts {
        info!(
            scenario = %verdict.scenario,
            filter = %verdict.filter,
            path = %verdict.path.display(),
            "{}",
            verdict.summary
        );
    }
    info!(
        simulations = report.simulations,
        estimations = report.estimations,
        verdicts = report.verdicts.len(),
        "Run complete"
    );

    println!("run_tests end   : {}", timestamp());
    Ok(())
}

fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("odharness=info"));

    let json_logging = std::env::var("ODH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
