//! # News Trend Radar
//!
//! Collects Korean news search results for a keyword, finds keywords whose
//! mentions are surging, and turns the matching articles into an industry
//! briefing with a remote language model.
//!
//! ## Usage
//!
//! ```sh
//! news_trend_radar analyze --keyword 자동차보험 --total-days 15 --recent-days 2
//! news_trend_radar export --output-dir ./exports
//! news_trend_radar clear
//! ```
//!
//! ## Architecture
//!
//! The `analyze` command runs one sequential pipeline:
//! 1. **Crawling**: search each day of the window page by page, storing every hit
//! 2. **Trend detection**: compare keyword counts in the recent and earlier windows
//! 3. **Relevance filter**: ask the model which surging keywords matter to the persona
//! 4. **Summarizing**: summarize recent articles that mention the top keywords
//! 5. **Aggregation**: overall trend summary, then its implications for the domain
//! 6. **Output**: the report as Markdown, TXT and CSV, the summaries as TXT and
//!    CSV, and a JSON dump of the run
//!
//! Model calls never run concurrently and are separated by fixed pauses.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod gateway;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod prompts;
mod report;
mod scrapers;
mod storage;
#[cfg(test)]
mod testing;
mod trends;
mod utils;

use api::{PotensClient, TokioSleeper};
use cli::{AnalyzeArgs, Cli, Command};
use config::AppConfig;
use gateway::Gateway;
use normalize::Normalizer;
use outputs::{Record, json, markdown, spreadsheet, text};
use pipeline::{AnalysisRequest, Pipeline, PipelineSettings, Stage};
use prompts::PromptBook;
use scrapers::naver::NaverNews;
use storage::{ArticleStore, SqliteStore};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_trend_radar starting up");

    let args = Cli::parse();
    debug!(db = %args.db.display(), config = ?args.config, "Parsed CLI arguments");

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Unusable configuration file");
            return Err(e.into());
        }
    };

    match args.command {
        Command::Analyze(analyze_args) => {
            let (request, store) = prepare_analysis(&analyze_args, &config, &args.db).await?;
            analyze(request, &analyze_args, args.api_key, config, store).await?
        }
        Command::Export { output_dir } => export(&output_dir, &open_store(&args.db).await?).await?,
        Command::Clear => {
            let deleted = open_store(&args.db).await?.clear().await?;
            info!(deleted, "Deleted every stored article");
        }
    }

    info!(elapsed_ms = start_time.elapsed().as_millis(), "news_trend_radar finished");
    Ok(())
}

/// Validate the request before anything touches the disk, then make sure the
/// output directory is writable and open the store.
async fn prepare_analysis(
    args: &AnalyzeArgs,
    config: &AppConfig,
    db: &Path,
) -> Result<(AnalysisRequest, SqliteStore), Box<dyn Error>> {
    let request = build_request(args, config);
    if let Err(e) = request.validate() {
        error!(stage = %Stage::Aborted, error = %e, "Invalid analysis request; nothing was searched or stored");
        return Err(e.into());
    }
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }
    let store = open_store(db).await?;
    Ok((request, store))
}

async fn open_store(db: &Path) -> Result<SqliteStore, Box<dyn Error>> {
    match SqliteStore::open(db).await {
        Ok(store) => {
            info!(path = %store.path().display(), stored = store.count().await?, "Article database opened");
            Ok(store)
        }
        Err(e) => {
            error!(path = %db.display(), error = %e, "Could not open the article database");
            Err(e.into())
        }
    }
}

/// CLI flags over config file values over built-in defaults.
fn build_request(args: &AnalyzeArgs, config: &AppConfig) -> AnalysisRequest {
    let mut thresholds = config.trends.thresholds;
    if let Some(ratio) = args.min_surge_ratio {
        thresholds.min_surge_ratio = ratio;
    }
    if let Some(freq) = args.min_recent_freq {
        thresholds.min_recent_freq = freq;
    }
    AnalysisRequest {
        keyword: args.keyword.trim().to_string(),
        total_days: args.total_days,
        recent_days: args.recent_days,
        max_pages: args.max_pages,
        perspective: args
            .perspective
            .clone()
            .unwrap_or_else(|| config.report.perspective.clone()),
        thresholds,
    }
}

#[instrument(level = "info", skip_all, fields(keyword = %request.keyword))]
async fn analyze(
    request: AnalysisRequest,
    args: &AnalyzeArgs,
    api_key: Option<String>,
    config: AppConfig,
    store: SqliteStore,
) -> Result<(), Box<dyn Error>> {
    let api_key = api_key.unwrap_or_default();
    if api_key.trim().is_empty() {
        warn!("No API key given (--api-key or POTENS_API_KEY); model sections will show failure markers");
    }
    let client = PotensClient::new(
        config.api.endpoint.clone(),
        api_key,
        Duration::from_secs(config.api.timeout_secs),
    )?;
    let normalizer = Normalizer::with_extra_rules(&config.normalizer.extra_preambles)?;
    let gateway = Gateway::new(
        client,
        TokioSleeper,
        config.retry.clone(),
        config.throttle.clone(),
        config.corpus.clone(),
        PromptBook::new(config.report.language.clone(), config.report.domain.clone()),
        normalizer,
    );
    let pipeline = Pipeline::new(
        NaverNews::new()?,
        store,
        gateway,
        TokioSleeper,
        PipelineSettings::from_config(&config),
    );

    let today = Local::now().date_naive();
    let run = pipeline.run(request, today);
    let result = match args.deadline_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), run).await {
            Ok(result) => result,
            Err(elapsed) => {
                error!(deadline_secs = secs, "Analysis exceeded its deadline; nothing was exported");
                return Err(elapsed.into());
            }
        },
        None => run.await,
    }?;

    for notice in &result.notices {
        warn!(%notice, "Analysis notice");
    }

    let dir = &args.output_dir;
    let now = Local::now().naive_local();
    markdown::write_report(dir, &result.report, now).await?;
    text::write_report(dir, &result.report, now).await?;
    spreadsheet::write_report(dir, &result.report, now).await?;
    text::write_records(dir, "summarized_articles", result.summaries.iter().map(Record::from), now).await?;
    spreadsheet::write_records(dir, "summarized_articles", result.summaries.iter().map(Record::from), now).await?;
    json::write_result(dir, &result, now).await?;

    info!(
        collected = result.collected,
        trends = result.trends.len(),
        summarized = result.summaries.len(),
        "Analysis exported"
    );
    Ok(())
}

#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
async fn export(output_dir: &Path, store: &SqliteStore) -> Result<(), Box<dyn Error>> {
    let rows = store.list_all().await?;
    if rows.is_empty() {
        warn!("No stored articles to export");
        return Ok(());
    }
    ensure_writable_dir(output_dir).await?;

    let now = Local::now().naive_local();
    text::write_records(output_dir, "news_data", rows.iter().map(Record::from), now).await?;
    spreadsheet::write_records(output_dir, "news_data", rows.iter().map(Record::from), now).await?;
    info!(count = rows.len(), "Exported stored articles");
    Ok(())
}
