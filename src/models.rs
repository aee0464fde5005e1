//! Data models shared across the pipeline.
//!
//! - [`Article`]: one search hit as collected (title, link, day, snippet)
//! - [`StoredArticle`]: an article read back from the store with its crawl timestamp
//! - [`KeywordTrend`]: surge statistics for one keyword in one run
//! - [`AiText`]: model-generated text, or a recorded failure
//! - [`SummarizedArticle`]: an article whose snippet was replaced by an [`AiText`]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A news item collected from one `(keyword, date, page)` search unit.
///
/// `link` is the identity key across the whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Headline as shown on the results page.
    pub title: String,
    /// Absolute article URL.
    pub link: String,
    /// Publication day. `None` when the stored date could not be parsed.
    pub published: Option<NaiveDate>,
    /// Short preview text from the results page.
    pub snippet: String,
}

impl Article {
    pub fn new(title: impl Into<String>, link: impl Into<String>, published: NaiveDate, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            published: Some(published),
            snippet: snippet.into(),
        }
    }

    /// Text the keyword tokenizer runs over.
    pub fn keyword_text(&self) -> String {
        format!("{} {}", self.title, self.snippet)
    }

    /// `YYYY-MM-DD`, or an empty string for undated articles.
    pub fn date_label(&self) -> String {
        self.published.map(|d| d.to_string()).unwrap_or_default()
    }
}

/// An article row as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredArticle {
    pub article: Article,
    /// Local time of the last upsert, `YYYY-MM-DD HH:MM:SS`.
    pub crawled_at: String,
}

/// Surge statistics for one keyword.
///
/// `surge_ratio` is `recent_frequency / past_frequency`, or `f64::INFINITY`
/// when the keyword never appeared in the past window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordTrend {
    pub keyword: String,
    pub recent_frequency: u32,
    pub past_frequency: u32,
    #[serde(serialize_with = "serialize_ratio")]
    pub surge_ratio: f64,
}

impl KeywordTrend {
    /// No historical baseline.
    pub fn is_new(&self) -> bool {
        self.surge_ratio.is_infinite()
    }

    /// `2.50x`, or `new trend` for debut keywords.
    pub fn ratio_label(&self) -> String {
        if self.is_new() {
            "new trend".to_string()
        } else {
            format!("{:.2}x", self.surge_ratio)
        }
    }
}

// JSON has no infinity; debut keywords serialize as null.
fn serialize_ratio<S: Serializer>(ratio: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if ratio.is_finite() {
        serializer.serialize_f64(*ratio)
    } else {
        serializer.serialize_none()
    }
}

/// Output of a model call once it has been turned into data.
///
/// Failures are kept and rendered, never dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum AiText {
    Generated(String),
    Failed(String),
}

impl AiText {
    pub fn is_failed(&self) -> bool {
        matches!(self, AiText::Failed(_))
    }
}

impl fmt::Display for AiText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiText::Generated(text) => f.write_str(text),
            AiText::Failed(reason) => write!(f, "[generation failed] {reason}"),
        }
    }
}

/// An article selected for summarization, with its AI summary or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummarizedArticle {
    pub title: String,
    pub link: String,
    pub date: String,
    pub content: AiText,
}
