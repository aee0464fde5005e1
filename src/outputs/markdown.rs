//! Markdown rendering of an [`AnalysisReport`].

use crate::report::{AnalysisReport, ArticleAppendix};
use crate::utils::timestamped_filename;
use chrono::NaiveDateTime;
use std::error::Error;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

pub fn render_report(report: &AnalysisReport) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# {}\n", report.title);
    let _ = writeln!(md, "## Overview\n\n{}\n", report.overview);

    for section in [&report.trend_summary, &report.implications] {
        let _ = writeln!(md, "## {}\n\n{}\n", section.heading(), section.body);
    }

    md.push_str("---\n\n## Appendix\n\n### Keyword evidence\n\n");
    if report.keyword_evidence.is_empty() {
        md.push_str("No keyword evidence available.\n\n");
    }
    for trend in &report.keyword_evidence {
        let _ = writeln!(
            md,
            "- **Keyword**: {}\n  - Recent mentions: {}\n  - Earlier mentions: {}\n  - Growth: {}\n",
            trend.keyword,
            trend.recent_frequency,
            trend.past_frequency,
            trend.ratio_label()
        );
    }

    md.push_str("### Articles reflected\n\n");
    if report.articles.is_empty() {
        md.push_str("No articles were reflected in this report.\n");
    }
    match &report.articles {
        ArticleAppendix::Raw(entries) => {
            for (i, entry) in entries.iter().enumerate() {
                let _ = writeln!(
                    md,
                    "{}. **Title**: {}\n   **Date**: {}\n   **Link**: {}\n   **Summary**: {}\n",
                    i + 1,
                    entry.title,
                    entry.date,
                    entry.link,
                    entry.preview
                );
            }
        }
        ArticleAppendix::Batched(batches) => {
            for (i, batch) in batches.iter().enumerate() {
                let _ = writeln!(
                    md,
                    "{}. **Articles**: {}\n   **Summary**: {}\n",
                    i + 1,
                    batch.titles.join(" / "),
                    batch.summary
                );
            }
        }
    }

    md
}

#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_report(dir: &Path, report: &AnalysisReport, at: NaiveDateTime) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.join(timestamped_filename("trend_report", "md", at));
    fs::write(&path, render_report(report)).await?;
    info!(path = %path.display(), "Wrote Markdown report");
    Ok(path)
}
