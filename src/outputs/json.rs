//! JSON dump of a whole analysis run.
//!
//! The file holds the request, every detected trend, the ranked and chosen
//! keywords, per-article summaries (with failures tagged), the report and the
//! run notices. Debut keywords have a `null` surge ratio.

use crate::pipeline::AnalysisResult;
use crate::utils::timestamped_filename;
use chrono::NaiveDateTime;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Write `result` as pretty-printed JSON to `analysis_<timestamp>.json` in `dir`.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_result(dir: &Path, result: &AnalysisResult, at: NaiveDateTime) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(result)?;

    if let Err(e) = fs::create_dir_all(dir).await {
        error!(error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = dir.join(timestamped_filename("analysis", "json", at));
    info!(path = %path.display(), "Writing JSON");
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote analysis JSON file");

    Ok(path)
}
