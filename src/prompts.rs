//! Prompt text for every model call the pipeline makes.
//!
//! Prompts are plain English instructions that ask for the answer in the
//! configured language, so the same templates serve Korean and English runs.

use crate::models::{Article, KeywordTrend, SummarizedArticle};
use serde_json::{Value, json};

/// Response schema for the keyword relevance filter: an array of strings.
pub fn keyword_list_schema() -> Value {
    json!({"type": "ARRAY", "items": {"type": "STRING"}})
}

/// Upper bound on keywords the relevance filter may return.
pub const MAX_RELEVANT_KEYWORDS: usize = 5;

#[derive(Debug, Clone)]
pub struct PromptBook {
    language: String,
    domain: String,
}

impl PromptBook {
    pub fn new(language: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            domain: domain.into(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn answer_in(&self) -> String {
        format!("Answer in {}. Reply with plain prose only, no markdown and no introductory sentence.", self.language)
    }

    pub fn classify_keywords(&self, trends: &[KeywordTrend], perspective: &str) -> String {
        let listed: Vec<Value> = trends
            .iter()
            .map(|t| json!({"keyword": t.keyword, "recent_freq": t.recent_frequency}))
            .collect();
        format!(
            "Below is a list of trending keywords found in recent news articles. \
             From the point of view of {perspective}, pick at most {MAX_RELEVANT_KEYWORDS} of them, \
             ordered from most to least significant, and return them as a JSON array. \
             Return only the JSON array with no explanation. Every element must be a string \
             copied exactly from the list.\n\n\
             Keywords: {}",
            Value::Array(listed)
        )
    }

    pub fn summarize_article(&self, article: &Article) -> String {
        format!(
            "Here is information about a news article. Summarize the article.\n\
             If you cannot open the link or cannot find the article, summarize it using only the \
             title, date and preview given below.\n\
             Give only the key points, without ads or unrelated information. {}\n\n\
             Title: {}\n\
             Link: {}\n\
             Date: {}\n\
             Preview: {}",
            self.answer_in(),
            article.title,
            article.link,
            article.date_label(),
            article.snippet
        )
    }

    /// Pre-compression of one slice of an over-long corpus.
    pub fn summarize_chunk(&self, chunk: &str) -> String {
        format!(
            "Summarize the following text concisely. {}\n\nText: {chunk}",
            self.answer_in()
        )
    }

    pub fn summarize_trends(&self, corpus: &str) -> String {
        format!(
            "The following combines summaries of recent news articles.\n\
             Based on it, concisely summarize the overall news trend. {}\n\n\
             Combined news summaries:\n{corpus}",
            self.answer_in()
        )
    }

    pub fn infer_implications(&self, trend_summary: &str) -> String {
        format!(
            "The following summarizes recent news trends.\n\
             Based on this summary, concisely describe the impact these trends could have on {}. {}\n\n\
             News trend summary:\n{trend_summary}",
            self.domain,
            self.answer_in()
        )
    }

    /// One appendix batch, answered in at most `max_chars` characters.
    pub fn summarize_batch(&self, batch: &[SummarizedArticle], max_chars: usize) -> String {
        let body = batch
            .iter()
            .map(|a| format!("Title: {}\nSummary: {}", a.title, a.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "Summarize the following news articles together in at most {max_chars} characters. {}\n\n{body}",
            self.answer_in()
        )
    }
}

/// `Title/Date/Summary` blocks joined by a rule, as fed to the trend summary.
pub fn corpus_block(articles: &[&SummarizedArticle]) -> String {
    articles
        .iter()
        .map(|a| format!("Title: {}\nDate: {}\nSummary: {}", a.title, a.date, a.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
