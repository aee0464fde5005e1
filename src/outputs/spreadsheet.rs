//! CSV export for spreadsheet tools.
//!
//! Files start with a UTF-8 byte-order mark so spreadsheet applications pick
//! the right encoding for Hangul text.

use crate::outputs::Record;
use crate::report::{AnalysisReport, ArticleAppendix};
use crate::utils::timestamped_filename;
use chrono::NaiveDateTime;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// One header row plus one row per record. The `collected` column is only
/// present when the first record has a crawl time.
pub fn to_csv<'a>(records: impl IntoIterator<Item = Record<'a>>) -> Result<Vec<u8>, csv::Error> {
    let mut records = records.into_iter().peekable();
    let with_collected = records.peek().is_some_and(|r| r.collected.is_some());

    let mut writer = csv::Writer::from_writer(BOM.to_vec());
    let mut header = vec!["title", "link", "date", "content"];
    if with_collected {
        header.push("collected");
    }
    writer.write_record(&header)?;

    for r in records {
        let mut row = vec![r.title.to_string(), r.link.to_string(), r.date, r.content];
        if with_collected {
            row.push(r.collected.unwrap_or_default().to_string());
        }
        writer.write_record(&row)?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

#[instrument(level = "info", skip_all, fields(dir = %dir.display(), prefix))]
pub async fn write_records<'a>(
    dir: &Path,
    prefix: &str,
    records: impl IntoIterator<Item = Record<'a>>,
    at: NaiveDateTime,
) -> Result<PathBuf, Box<dyn Error>> {
    let bytes = to_csv(records)?;
    let path = dir.join(timestamped_filename(prefix, "csv", at));
    fs::write(&path, bytes).await?;
    info!(path = %path.display(), "Wrote CSV export");
    Ok(path)
}

/// The report as one table: `overview`, `trend_summary` and `implications`
/// rows, one `keyword` row per evidence record, then one `article` (raw
/// appendix) or `batch` row per appendix entry.
pub fn report_to_csv(report: &AnalysisReport) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(BOM.to_vec());
    writer.write_record(["section", "name", "date", "link", "content"])?;

    writer.write_record(["overview", report.title.as_str(), "", "", report.overview.as_str()])?;
    for (kind, section) in [("trend_summary", &report.trend_summary), ("implications", &report.implications)] {
        let heading = section.heading();
        let body = section.body.to_string();
        writer.write_record([kind, heading.as_str(), "", "", body.as_str()])?;
    }

    for trend in &report.keyword_evidence {
        let detail = format!(
            "recent {}, earlier {}, growth {}",
            trend.recent_frequency,
            trend.past_frequency,
            trend.ratio_label()
        );
        writer.write_record(["keyword", trend.keyword.as_str(), "", "", detail.as_str()])?;
    }

    match &report.articles {
        ArticleAppendix::Raw(entries) => {
            for entry in entries {
                writer.write_record([
                    "article",
                    entry.title.as_str(),
                    entry.date.as_str(),
                    entry.link.as_str(),
                    entry.preview.as_str(),
                ])?;
            }
        }
        ArticleAppendix::Batched(batches) => {
            for batch in batches {
                let titles = batch.titles.join(" / ");
                let summary = batch.summary.to_string();
                writer.write_record(["batch", titles.as_str(), "", "", summary.as_str()])?;
            }
        }
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}

#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_report(dir: &Path, report: &AnalysisReport, at: NaiveDateTime) -> Result<PathBuf, Box<dyn Error>> {
    let bytes = report_to_csv(report)?;
    let path = dir.join(timestamped_filename("trend_report", "csv", at));
    fs::write(&path, bytes).await?;
    info!(path = %path.display(), "Wrote CSV report");
    Ok(path)
}
