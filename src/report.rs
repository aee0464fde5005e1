//! The assembled analysis report.
//!
//! Assembly never fails: every section holds an [`AiText`], and a failed
//! section is rendered with its failure text instead of being dropped.

use crate::gateway::BatchSummary;
use crate::models::{AiText, KeywordTrend, SummarizedArticle};
use crate::utils::preview;
use serde::{Deserialize, Serialize};

/// How the "Articles reflected" part of the appendix is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendixMode {
    /// Each article with a short preview of its summary.
    #[default]
    Raw,
    /// Articles grouped in batches, one model summary per batch.
    Batched,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub title: String,
    pub body: AiText,
}

impl ReportSection {
    /// `title`, or `title (generation failed)` for a failed body.
    pub fn heading(&self) -> String {
        if self.body.is_failed() {
            format!("{} (generation failed)", self.title)
        } else {
            self.title.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleEntry {
    pub title: String,
    pub date: String,
    pub link: String,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "entries", rename_all = "snake_case")]
pub enum ArticleAppendix {
    Raw(Vec<ArticleEntry>),
    Batched(Vec<BatchSummary>),
}

impl ArticleAppendix {
    pub fn is_empty(&self) -> bool {
        match self {
            ArticleAppendix::Raw(entries) => entries.is_empty(),
            ArticleAppendix::Batched(batches) => batches.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub title: String,
    pub overview: String,
    pub trend_summary: ReportSection,
    pub implications: ReportSection,
    pub keyword_evidence: Vec<KeywordTrend>,
    pub articles: ArticleAppendix,
}

/// Raw appendix entries with summaries cut to `preview_chars`.
pub fn raw_entries(articles: &[SummarizedArticle], preview_chars: usize) -> ArticleAppendix {
    ArticleAppendix::Raw(
        articles
            .iter()
            .map(|a| ArticleEntry {
                title: a.title.clone(),
                date: a.date.clone(),
                link: a.link.clone(),
                preview: preview(&a.content.to_string(), preview_chars),
            })
            .collect(),
    )
}

pub fn assemble(
    keyword: &str,
    domain: &str,
    trend_summary: AiText,
    implications: AiText,
    keyword_evidence: Vec<KeywordTrend>,
    articles: ArticleAppendix,
) -> AnalysisReport {
    AnalysisReport {
        title: format!("News trend analysis: {keyword}"),
        overview: format!(
            "This report analyzes recent news coverage of \"{keyword}\", summarizes the emerging trends \
             and outlines what they may mean for {domain}."
        ),
        trend_summary: ReportSection {
            title: "News trend summary".to_string(),
            body: trend_summary,
        },
        implications: ReportSection {
            title: format!("Implications for {domain}"),
            body: implications,
        },
        keyword_evidence,
        articles,
    }
}
