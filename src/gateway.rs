//! Typed model operations built on a retrying [`Completion`].
//!
//! Nothing here returns an error to the caller. Every failed call becomes
//! data: an empty keyword list, or an [`AiText::Failed`] that the report
//! renders inline.

use crate::api::{Completion, Reply, RetryCompletion, RetryPolicy, Sleeper};
use crate::config::{CorpusSettings, Throttle};
use crate::error::GatewayError;
use crate::models::{AiText, Article, KeywordTrend, SummarizedArticle};
use crate::normalize::Normalizer;
use crate::prompts::{self, MAX_RELEVANT_KEYWORDS, PromptBook};
use crate::utils::truncate_for_log;
use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// Reason recorded when the corpus summary has nothing to work with.
pub const NO_ARTICLES: &str = "no articles to summarize";
/// Reason recorded when implications are requested without a usable summary.
pub const NO_TREND_SUMMARY: &str = "no trend summary to reason over";

/// Longest appendix batch summary requested from the model, in characters.
pub const BATCH_SUMMARY_CHARS: usize = 150;

/// A group of articles summarized together for the report appendix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub titles: Vec<String>,
    pub summary: AiText,
}

pub struct Gateway<C, S> {
    client: RetryCompletion<C, S>,
    sleeper: S,
    throttle: Throttle,
    corpus: CorpusSettings,
    prompts: PromptBook,
    normalizer: Normalizer,
}

impl<C, S> Gateway<C, S>
where
    C: Completion,
    S: Sleeper,
{
    pub fn new(
        client: C,
        sleeper: S,
        retry: RetryPolicy,
        throttle: Throttle,
        corpus: CorpusSettings,
        prompts: PromptBook,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            client: RetryCompletion::new(client, sleeper.clone(), retry),
            sleeper,
            throttle,
            corpus,
            prompts,
            normalizer,
        }
    }

    pub fn prompts(&self) -> &PromptBook {
        &self.prompts
    }

    /// One prompt through the retry policy.
    pub async fn call_with_retry(&self, prompt: &str, schema: Option<&Value>) -> Result<Reply, GatewayError> {
        self.client.complete(prompt, schema).await
    }

    /// Free-text call, normalized to flat prose. An empty reply counts as a failure.
    async fn text_call(&self, prompt: &str) -> AiText {
        match self.call_with_retry(prompt, None).await {
            Ok(reply) => {
                let raw = reply.into_text();
                let clean = self.normalizer.normalize(&raw);
                if clean.is_empty() {
                    warn!(raw = %truncate_for_log(&raw, 200), "Model reply was empty after normalization");
                    AiText::Failed("the model returned an empty reply".to_string())
                } else {
                    AiText::Generated(clean)
                }
            }
            Err(e) => AiText::Failed(e.to_string()),
        }
    }

    /// Up to five keywords, most relevant to `perspective` first.
    ///
    /// Empty on any failure, including replies that are not an array of strings.
    #[instrument(level = "info", skip_all, fields(candidates = trends.len()))]
    pub async fn classify_relevant_keywords(&self, trends: &[KeywordTrend], perspective: &str) -> Vec<String> {
        if trends.is_empty() {
            return Vec::new();
        }
        let prompt = self.prompts.classify_keywords(trends, perspective);
        let schema = prompts::keyword_list_schema();

        let result = self
            .call_with_retry(&prompt, Some(&schema))
            .await
            .and_then(keyword_list);

        match result {
            Ok(keywords) => {
                info!(count = keywords.len(), keywords = ?keywords, "Relevance filter ranked keywords");
                keywords
            }
            Err(e) => {
                warn!(error = %e, "Relevance filter failed; returning no ranking");
                Vec::new()
            }
        }
    }

    #[instrument(level = "info", skip_all, fields(link = %article.link))]
    pub async fn summarize_article(&self, article: &Article) -> AiText {
        let prompt = self.prompts.summarize_article(article);
        let summary = self.text_call(&prompt).await;
        if let AiText::Failed(reason) = &summary {
            warn!(title = %article.title, %reason, "Article summary failed");
        }
        summary
    }

    /// Overall trend summary across the summarized articles.
    ///
    /// Articles whose own summary failed are left out. A corpus longer than
    /// the direct limit is first cut into fixed-size chunks that are
    /// summarized one by one, pausing between chunks.
    #[instrument(level = "info", skip_all, fields(articles = articles.len()))]
    pub async fn summarize_corpus(&self, articles: &[SummarizedArticle]) -> AiText {
        if articles.is_empty() {
            return AiText::Failed(NO_ARTICLES.to_string());
        }
        let usable: Vec<&SummarizedArticle> = articles.iter().filter(|a| !a.content.is_failed()).collect();
        if usable.is_empty() {
            warn!("Every article summary failed; nothing to aggregate");
            return AiText::Failed(format!("{NO_ARTICLES}: all {} article summaries failed", articles.len()));
        }

        let corpus = prompts::corpus_block(&usable);
        let corpus_chars = corpus.chars().count();

        let material = if corpus_chars <= self.corpus.direct_limit_chars {
            corpus
        } else {
            match self.compress(&corpus).await {
                Ok(compressed) => compressed,
                Err(reason) => return AiText::Failed(reason),
            }
        };

        let prompt = self.prompts.summarize_trends(&material);
        self.text_call(&prompt).await
    }

    async fn compress(&self, corpus: &str) -> Result<String, String> {
        let chunk_chars = self.corpus.chunk_chars.max(1);
        let chunks: Vec<String> = corpus
            .chars()
            .chunks(chunk_chars)
            .into_iter()
            .map(|c| c.collect())
            .collect();
        info!(chunks = chunks.len(), chunk_chars, "Corpus exceeds direct limit; summarizing in chunks");

        let mut summaries = Vec::with_capacity(chunks.len());
        let mut last_failure = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            match self.text_call(&self.prompts.summarize_chunk(chunk)).await {
                AiText::Generated(text) => summaries.push(text),
                AiText::Failed(reason) => {
                    warn!(chunk = i + 1, %reason, "Chunk summary failed; skipping it");
                    last_failure = reason;
                }
            }
            if i + 1 < chunks.len() {
                self.sleeper.sleep(self.throttle.chunk_delay()).await;
            }
        }

        if summaries.is_empty() {
            return Err(format!("all {} corpus chunks failed: {last_failure}", chunks.len()));
        }
        debug!(kept = summaries.len(), "Chunk summaries collected");
        Ok(summaries.join("\n\n"))
    }

    #[instrument(level = "info", skip_all)]
    pub async fn infer_domain_implications(&self, trend_summary: &AiText) -> AiText {
        let summary = match trend_summary {
            AiText::Generated(text) if !text.trim().is_empty() => text,
            AiText::Generated(_) => return AiText::Failed(NO_TREND_SUMMARY.to_string()),
            AiText::Failed(reason) => return AiText::Failed(format!("{NO_TREND_SUMMARY}: {reason}")),
        };
        let prompt = self.prompts.infer_implications(summary);
        self.text_call(&prompt).await
    }

    /// Appendix summaries, `batch_size` articles per call, pausing between batches.
    #[instrument(level = "info", skip_all, fields(articles = articles.len(), batch_size))]
    pub async fn summarize_batches(&self, articles: &[SummarizedArticle], batch_size: usize) -> Vec<BatchSummary> {
        let batches: Vec<&[SummarizedArticle]> = articles.chunks(batch_size.max(1)).collect();
        let mut out = Vec::with_capacity(batches.len());
        for (i, batch) in batches.iter().enumerate() {
            let prompt = self.prompts.summarize_batch(batch, BATCH_SUMMARY_CHARS);
            let summary = self.text_call(&prompt).await;
            if let AiText::Failed(reason) = &summary {
                warn!(batch = i + 1, %reason, "Appendix batch summary failed");
            }
            out.push(BatchSummary {
                titles: batch.iter().map(|a| a.title.clone()).collect(),
                summary,
            });
            if i + 1 < batches.len() {
                self.sleeper.sleep(self.throttle.batch_delay()).await;
            }
        }
        out
    }
}

/// Strings from a structured reply, trimmed, at most [`MAX_RELEVANT_KEYWORDS`].
fn keyword_list(reply: Reply) -> Result<Vec<String>, GatewayError> {
    let Reply::Structured(Value::Array(items)) = reply else {
        return Err(GatewayError::SchemaMismatch("expected a JSON array".to_string()));
    };
    let mut keywords = Vec::with_capacity(items.len());
    for item in items {
        let Value::String(s) = item else {
            return Err(GatewayError::SchemaMismatch(format!("array element {item} is not a string")));
        };
        let s = s.trim();
        if !s.is_empty() {
            keywords.push(s.to_string());
        }
    }
    keywords.truncate(MAX_RELEVANT_KEYWORDS);
    Ok(keywords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSleeper, ScriptedCompletion};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::time::Duration;

    fn gateway(client: ScriptedCompletion, sleeper: RecordingSleeper) -> Gateway<ScriptedCompletion, RecordingSleeper> {
        Gateway::new(
            client,
            sleeper,
            RetryPolicy::default(),
            Throttle::default(),
            CorpusSettings::default(),
            PromptBook::new("Korean", "the automobile insurance industry"),
            Normalizer::default(),
        )
    }

    fn trend(keyword: &str, recent: u32) -> KeywordTrend {
        KeywordTrend {
            keyword: keyword.into(),
            recent_frequency: recent,
            past_frequency: 0,
            surge_ratio: f64::INFINITY,
        }
    }

    fn summarized(title: &str, content: AiText) -> SummarizedArticle {
        SummarizedArticle {
            title: title.into(),
            link: format!("https://example.com/{title}"),
            date: "2025-06-01".into(),
            content,
        }
    }

    fn transport() -> GatewayError {
        GatewayError::TransportFailure {
            status: Some(503),
            detail: "unavailable".into(),
        }
    }

    #[tokio::test]
    async fn test_classify_returns_at_most_five() {
        let client = ScriptedCompletion::new(vec![Ok(Reply::Structured(json!(["a", "b", "c", "d", "e", "f", "g"])))]);
        let gw = gateway(client.clone(), RecordingSleeper::default());

        let keywords = gw.classify_relevant_keywords(&[trend("a", 3)], "an actuary").await;

        assert_eq!(keywords, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(client.structured_calls(), 1);
    }

    #[tokio::test]
    async fn test_classify_schema_mismatch_is_empty() {
        let client = ScriptedCompletion::new(vec![
            Ok(Reply::Structured(json!(["ok", 3]))),
            Ok(Reply::Structured(json!({"keywords": ["ok"]}))),
        ]);
        let gw = gateway(client.clone(), RecordingSleeper::default());

        assert!(gw.classify_relevant_keywords(&[trend("ok", 3)], "p").await.is_empty());
        assert!(gw.classify_relevant_keywords(&[trend("ok", 3)], "p").await.is_empty());
        // schema mismatches are not transport failures; each is a single successful call
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_classify_failure_is_empty_after_retries() {
        let client = ScriptedCompletion::always(Err(transport()));
        let sleeper = RecordingSleeper::default();
        let gw = gateway(client.clone(), sleeper.clone());

        assert!(gw.classify_relevant_keywords(&[trend("ev", 3)], "p").await.is_empty());
        assert_eq!(client.calls(), 2);
        assert_eq!(sleeper.pauses(), vec![Duration::from_secs(15)]);
    }

    #[tokio::test]
    async fn test_classify_without_trends_makes_no_call() {
        let client = ScriptedCompletion::default();
        let gw = gateway(client.clone(), RecordingSleeper::default());
        assert!(gw.classify_relevant_keywords(&[], "p").await.is_empty());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_summarize_article_normalizes_reply() {
        let client = ScriptedCompletion::new(vec![Ok(Reply::Text(
            "요약해 드리겠습니다.\n\n- **보험료** 인상이 예고되었습니다.".into(),
        ))]);
        let gw = gateway(client, RecordingSleeper::default());
        let article = Article::new(
            "보험료 인상",
            "https://example.com/1",
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            "snippet",
        );

        let summary = gw.summarize_article(&article).await;

        assert_eq!(summary, AiText::Generated("보험료 인상이 예고되었습니다.".into()));
    }

    #[tokio::test]
    async fn test_summarize_article_failure_is_visible() {
        let client = ScriptedCompletion::always(Err(transport()));
        let gw = gateway(client, RecordingSleeper::default());
        let article = Article::new("t", "https://example.com/1", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), "");

        let summary = gw.summarize_article(&article).await;

        match summary {
            AiText::Failed(reason) => assert!(reason.starts_with("AI call failed after 2 attempts")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_summarize_corpus_empty_makes_no_call() {
        let client = ScriptedCompletion::default();
        let gw = gateway(client.clone(), RecordingSleeper::default());

        assert_eq!(gw.summarize_corpus(&[]).await, AiText::Failed(NO_ARTICLES.into()));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_summarize_corpus_all_failed_makes_no_call() {
        let client = ScriptedCompletion::default();
        let gw = gateway(client.clone(), RecordingSleeper::default());

        let result = gw.summarize_corpus(&[summarized("a", AiText::Failed("x".into()))]).await;

        assert!(result.is_failed());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_short_corpus_is_one_call() {
        let client = ScriptedCompletion::always(Ok(Reply::Text("trend".into())));
        let sleeper = RecordingSleeper::default();
        let gw = gateway(client.clone(), sleeper.clone());

        let result = gw
            .summarize_corpus(&[
                summarized("a", AiText::Generated("one".into())),
                summarized("b", AiText::Failed("x".into())),
            ])
            .await;

        assert_eq!(result, AiText::Generated("trend".into()));
        assert_eq!(client.calls(), 1);
        assert!(client.prompts()[0].contains("Summary: one"));
        assert!(!client.prompts()[0].contains("Title: b"));
        assert!(sleeper.pauses().is_empty());
    }

    #[tokio::test]
    async fn test_long_corpus_is_chunked_with_pauses() {
        let client = ScriptedCompletion::always(Ok(Reply::Text("chunk summary".into())));
        let sleeper = RecordingSleeper::default();
        let gw = gateway(client.clone(), sleeper.clone());
        let long = "가".repeat(1_200);

        let result = gw
            .summarize_corpus(&[
                summarized("a", AiText::Generated(long.clone())),
                summarized("b", AiText::Generated(long)),
            ])
            .await;

        assert!(!result.is_failed());
        let calls = client.calls();
        let chunk_calls = calls - 1;
        assert!(chunk_calls >= 5, "expected several chunk calls, got {chunk_calls}");
        assert_eq!(sleeper.pauses().len(), chunk_calls - 1);
        assert!(sleeper.pauses().iter().all(|d| *d == Duration::from_secs(10)));
        assert!(client.prompts().last().unwrap().contains("chunk summary\n\nchunk summary"));
    }

    #[tokio::test]
    async fn test_long_corpus_all_chunks_failing_is_failed() {
        let client = ScriptedCompletion::always(Err(GatewayError::MissingCredential));
        let gw = gateway(client.clone(), RecordingSleeper::default());
        let long = "x".repeat(2_000);

        let result = gw.summarize_corpus(&[summarized("a", AiText::Generated(long))]).await;

        match result {
            AiText::Failed(reason) => assert!(reason.contains("corpus chunks failed")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_implications_skip_failed_summary() {
        let client = ScriptedCompletion::default();
        let gw = gateway(client.clone(), RecordingSleeper::default());

        let result = gw.infer_domain_implications(&AiText::Failed("boom".into())).await;

        assert_eq!(result, AiText::Failed(format!("{NO_TREND_SUMMARY}: boom")));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_implications_mention_domain() {
        let client = ScriptedCompletion::always(Ok(Reply::Text("premiums may rise".into())));
        let gw = gateway(client.clone(), RecordingSleeper::default());

        let result = gw
            .infer_domain_implications(&AiText::Generated("EV sales surged".into()))
            .await;

        assert_eq!(result, AiText::Generated("premiums may rise".into()));
        assert!(client.prompts()[0].contains("the automobile insurance industry"));
    }

    #[tokio::test]
    async fn test_batches_group_and_pause() {
        let client = ScriptedCompletion::new(vec![
            Ok(Reply::Text("first".into())),
            Err(GatewayError::MissingCredential),
        ]);
        let sleeper = RecordingSleeper::default();
        let gw = gateway(client.clone(), sleeper.clone());
        let articles: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|t| summarized(t, AiText::Generated(format!("{t} text"))))
            .collect();

        let batches = gw.summarize_batches(&articles, 3).await;

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].titles, vec!["a", "b", "c"]);
        assert_eq!(batches[0].summary, AiText::Generated("first".into()));
        assert_eq!(batches[1].titles, vec!["d"]);
        assert!(batches[1].summary.is_failed());
        assert_eq!(sleeper.pauses(), vec![Duration::from_millis(500)]);
    }
}
