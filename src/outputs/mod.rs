//! Export writers.
//!
//! # Submodules
//!
//! - [`text`]: plain-text record dump (`Title/Link/Date/Content` blocks) and
//!   the report as plain prose
//! - [`spreadsheet`]: CSV with a UTF-8 BOM, one row per article, and the
//!   report as section, keyword and article rows
//! - [`markdown`]: the assembled [`AnalysisReport`](crate::report::AnalysisReport)
//! - [`json`]: the whole [`AnalysisResult`](crate::pipeline::AnalysisResult)
//!
//! Every file is named `<prefix>_<YYYYmmdd_HHMMSS>.<ext>`:
//!
//! ```text
//! output_dir/
//! ├── news_data_20250610_091500.txt
//! ├── news_data_20250610_091500.csv
//! ├── trend_report_20250610_093012.md
//! ├── trend_report_20250610_093012.txt
//! ├── trend_report_20250610_093012.csv
//! ├── summarized_articles_20250610_093012.txt
//! ├── summarized_articles_20250610_093012.csv
//! └── analysis_20250610_093012.json
//! ```

use crate::models::{StoredArticle, SummarizedArticle};

pub mod json;
pub mod markdown;
pub mod spreadsheet;
pub mod text;

/// One exported article, whichever stage it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<'a> {
    pub title: &'a str,
    pub link: &'a str,
    pub date: String,
    pub content: String,
    /// Crawl time, present for rows read back from the store.
    pub collected: Option<&'a str>,
}

impl<'a> From<&'a StoredArticle> for Record<'a> {
    fn from(row: &'a StoredArticle) -> Self {
        Self {
            title: &row.article.title,
            link: &row.article.link,
            date: row.article.date_label(),
            content: row.article.snippet.clone(),
            collected: Some(&row.crawled_at),
        }
    }
}

impl<'a> From<&'a SummarizedArticle> for Record<'a> {
    fn from(article: &'a SummarizedArticle) -> Self {
        Self {
            title: &article.title,
            link: &article.link,
            date: article.date.clone(),
            content: article.content.to_string(),
            collected: None,
        }
    }
}
