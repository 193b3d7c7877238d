mod aggregate;
mod config;
mod extract;
mod http;
mod metrics;
mod models;
mod normalize;
mod render;
mod resolve;
mod scheduler;
mod sink;
mod sources;

use crate::aggregate::ResultAggregator;
use crate::config::RunConfig;
use crate::http::HttpSession;
use crate::render::{Renderer, WebDriverRenderer};
use crate::scheduler::ResolutionScheduler;
use eyre::{Result, WrapErr};
use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

static INPUT_PATH: Lazy<String> =
    Lazy::new(|| env::var("PRICESCAN_INPUT").unwrap_or_else(|_| "articles.csv".to_string()));

static OUTPUT_PATH: Lazy<String> =
    Lazy::new(|| env::var("PRICESCAN_OUTPUT").unwrap_or_else(|_| "prices.csv".to_string()));

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "pricescan", "run failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    let input = PathBuf::from(args.next().unwrap_or_else(|| INPUT_PATH.clone()));
    let output = PathBuf::from(args.next().unwrap_or_else(|| OUTPUT_PATH.clone()));

    let config = RunConfig::load().wrap_err("invalid configuration")?;
    let run_id = uuid::Uuid::new_v4();
    info!(
        target = "pricescan",
        %run_id,
        batch_size = config.batch_size,
        max_concurrent = config.max_concurrent_per_batch,
        sources = ?config.sources,
        "run starting"
    );

    // A missing or empty input list is fatal; partial failures later on
    // are not.
    let identifiers = sink::load_identifiers(&input).wrap_err("could not load identifiers")?;

    let session = Arc::new(
        HttpSession::open(config.per_request_timeout).wrap_err("could not build http session")?,
    );
    let renderer: Option<Arc<dyn Renderer>> = config
        .webdriver_url
        .as_deref()
        .map(|endpoint| Arc::new(WebDriverRenderer::new(endpoint)) as Arc<dyn Renderer>);
    let resolvers = sources::build_resolvers(&config, session, renderer);

    let scheduler = ResolutionScheduler::new(config, resolvers);
    let sources = scheduler.sources();
    let completions = scheduler.run(&identifiers).await;
    let (records, summary) = ResultAggregator::finalize(completions);
    summary.log();

    sink::write_csv(&output, &records, &sources).wrap_err("could not write csv report")?;
    let json_output = output.with_extension("json");
    sink::write_json(&json_output, &records).wrap_err("could not write json report")?;

    info!(
        target = "pricescan",
        %run_id,
        records = records.len(),
        output = %output.display(),
        "run finished"
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
