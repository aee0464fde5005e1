//! Command-line interface definitions for News Trend Radar.
//!
//! Options can be given as flags; the API key can also come from the
//! `POTENS_API_KEY` environment variable. Flags override values from the
//! optional YAML config file.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the News Trend Radar application.
///
/// # Examples
///
/// ```sh
/// # Analyze the last 15 days, treating the last 2 as the trend window
/// news_trend_radar analyze --keyword 자동차보험
///
/// # Tighter window, custom persona, give up after ten minutes
/// news_trend_radar analyze -k 전기차 --total-days 7 --recent-days 1 \
///     --perspective "a fleet-insurance underwriter" --deadline-secs 600
///
/// # Dump everything collected so far
/// news_trend_radar export --output-dir ./exports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// SQLite database holding collected articles
    #[arg(long, global = true, default_value = "news_data.db")]
    pub db: PathBuf,

    /// Optional path to a YAML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// API key for the summarization service
    #[arg(long, global = true, env = "POTENS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl, detect trending keywords and write a report
    Analyze(AnalyzeArgs),

    /// Write every stored article to TXT and CSV
    Export {
        /// Directory for the exported files
        #[arg(short, long, default_value = "./reports")]
        output_dir: PathBuf,
    },

    /// Delete every stored article
    Clear,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Search keyword
    #[arg(short, long)]
    pub keyword: String,

    /// Days to search, today included
    #[arg(long, default_value_t = 15)]
    pub total_days: u32,

    /// Trailing days treated as the recent trend window
    #[arg(long, default_value_t = 2)]
    pub recent_days: u32,

    /// Result pages to read per day (ten articles each)
    #[arg(long, default_value_t = 3)]
    pub max_pages: u32,

    /// Persona the relevance filter ranks keywords for
    #[arg(long)]
    pub perspective: Option<String>,

    /// Minimum recent/past frequency ratio
    #[arg(long)]
    pub min_surge_ratio: Option<f64>,

    /// Minimum mentions in the recent window
    #[arg(long)]
    pub min_recent_freq: Option<u32>,

    /// Directory for the report files
    #[arg(short, long, default_value = "./reports")]
    pub output_dir: PathBuf,

    /// Abort the whole analysis after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,
}
