//! Plain-text record dump and report rendering.

use crate::outputs::Record;
use crate::report::{AnalysisReport, ArticleAppendix};
use crate::utils::timestamped_filename;
use chrono::NaiveDateTime;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

const RULE_WIDTH: usize = 50;

/// `Title/Link/Date/Content[/Collected]` blocks, each followed by a rule line.
pub fn render_records<'a>(records: impl IntoIterator<Item = Record<'a>>) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let mut lines = Vec::new();
    for r in records {
        lines.push(format!("Title: {}", r.title));
        lines.push(format!("Link: {}", r.link));
        lines.push(format!("Date: {}", r.date));
        lines.push(format!("Content: {}", r.content));
        if let Some(collected) = r.collected {
            lines.push(format!("Collected: {collected}"));
        }
        lines.push(rule.clone());
    }
    lines.join("\n")
}

#[instrument(level = "info", skip_all, fields(dir = %dir.display(), prefix))]
pub async fn write_records<'a>(
    dir: &Path,
    prefix: &str,
    records: impl IntoIterator<Item = Record<'a>>,
    at: NaiveDateTime,
) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.join(timestamped_filename(prefix, "txt", at));
    fs::write(&path, render_records(records)).await?;
    info!(path = %path.display(), "Wrote text export");
    Ok(path)
}

/// The report as plain prose: sections separated by rule lines, then the
/// keyword evidence and the reflected articles.
pub fn render_report(report: &AnalysisReport) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let mut lines = vec![report.title.clone(), rule.clone(), report.overview.clone(), rule.clone()];

    for section in [&report.trend_summary, &report.implications] {
        lines.push(format!("[{}]", section.heading()));
        lines.push(section.body.to_string());
        lines.push(rule.clone());
    }

    lines.push("[Keyword evidence]".to_string());
    if report.keyword_evidence.is_empty() {
        lines.push("No keyword evidence available.".to_string());
    }
    for trend in &report.keyword_evidence {
        lines.push(format!(
            "{}: recent {}, earlier {}, growth {}",
            trend.keyword,
            trend.recent_frequency,
            trend.past_frequency,
            trend.ratio_label()
        ));
    }
    lines.push(rule.clone());

    lines.push("[Articles reflected]".to_string());
    if report.articles.is_empty() {
        lines.push("No articles were reflected in this report.".to_string());
    }
    match &report.articles {
        ArticleAppendix::Raw(entries) => {
            for entry in entries {
                lines.push(format!("Title: {}", entry.title));
                lines.push(format!("Link: {}", entry.link));
                lines.push(format!("Date: {}", entry.date));
                lines.push(format!("Summary: {}", entry.preview));
                lines.push(String::new());
            }
        }
        ArticleAppendix::Batched(batches) => {
            for batch in batches {
                lines.push(format!("Articles: {}", batch.titles.join(" / ")));
                lines.push(format!("Summary: {}", batch.summary));
                lines.push(String::new());
            }
        }
    }

    lines.join("\n")
}

#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_report(dir: &Path, report: &AnalysisReport, at: NaiveDateTime) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.join(timestamped_filename("trend_report", "txt", at));
    fs::write(&path, render_report(report)).await?;
    info!(path = %path.display(), "Wrote text report");
    Ok(path)
}
