//! One analysis run, from search to report.
//!
//! ```text
//! Validating -> Crawling (+ Persisting) -> DetectingTrends -> ClassifyingKeywords
//!   -> SelectingArticles -> Summarizing -> AggregatingInsights -> AssemblingReport -> Done
//! ```
//!
//! Every stage awaits sequentially. Only validation can end a run early; any
//! later failure is logged and carried into the result as data, so a run
//! always ends with a report.

use crate::api::{Completion, Sleeper};
use crate::config::{AppConfig, Throttle};
use crate::error::ValidationError;
use crate::gateway::Gateway;
use crate::models::{Article, KeywordTrend, SummarizedArticle};
use crate::report::{self, AnalysisReport, AppendixMode, ArticleAppendix};
use crate::scrapers::NewsSource;
use crate::storage::ArticleStore;
use crate::trends::{Bucket, Tokenizer, TrendDetector, TrendThresholds, TrendWindow, UndatedPolicy};
use chrono::{Duration, NaiveDate};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Validating,
    Crawling,
    DetectingTrends,
    ClassifyingKeywords,
    SelectingArticles,
    Summarizing,
    AggregatingInsights,
    AssemblingReport,
    Done,
    /// Terminal state for a rejected request.
    Aborted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Validating => "validating",
            Stage::Crawling => "crawling",
            Stage::DetectingTrends => "detecting_trends",
            Stage::ClassifyingKeywords => "classifying_keywords",
            Stage::SelectingArticles => "selecting_articles",
            Stage::Summarizing => "summarizing",
            Stage::AggregatingInsights => "aggregating_insights",
            Stage::AssemblingReport => "assembling_report",
            Stage::Done => "done",
            Stage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What to analyze.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub keyword: String,
    pub total_days: u32,
    pub recent_days: u32,
    pub max_pages: u32,
    /// Persona the relevance filter ranks keywords for.
    pub perspective: String,
    pub thresholds: TrendThresholds,
}

impl AnalysisRequest {
    pub fn validate(&self) -> Result<TrendWindow, ValidationError> {
        if self.keyword.trim().is_empty() {
            return Err(ValidationError::EmptyKeyword);
        }
        if self.max_pages == 0 {
            return Err(ValidationError::NotPositive {
                field: "max_pages",
                value: 0,
            });
        }
        TrendWindow::new(self.recent_days, self.total_days)
    }
}

/// Everything a run produced, handed to the exporters.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub request: AnalysisRequest,
    pub run_date: NaiveDate,
    pub collected: usize,
    pub trends: Vec<KeywordTrend>,
    /// Ranking returned by the relevance filter, empty when it failed.
    pub ranked_keywords: Vec<String>,
    pub top_keywords: Vec<String>,
    pub summaries: Vec<SummarizedArticle>,
    pub report: AnalysisReport,
    /// Human-readable notes about empty or degraded stages.
    pub notices: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub top_keywords: usize,
    pub undated: UndatedPolicy,
    pub extra_stopwords: Vec<String>,
    pub throttle: Throttle,
    pub appendix: AppendixMode,
    pub batch_size: usize,
    pub preview_chars: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_keywords: config.trends.top_keywords,
            undated: config.trends.undated,
            extra_stopwords: config.trends.extra_stopwords.clone(),
            throttle: config.throttle.clone(),
            appendix: config.report.appendix,
            batch_size: config.report.batch_size,
            preview_chars: config.report.preview_chars,
        }
    }
}

pub struct Pipeline<Src, St, C, S> {
    source: Src,
    store: St,
    gateway: Gateway<C, S>,
    sleeper: S,
    settings: PipelineSettings,
}

impl<Src, St, C, S> Pipeline<Src, St, C, S>
where
    Src: NewsSource,
    St: ArticleStore,
    C: Completion,
    S: Sleeper,
{
    pub fn new(source: Src, store: St, gateway: Gateway<C, S>, sleeper: S, settings: PipelineSettings) -> Self {
        debug!(stage = %Stage::Idle, top_keywords = settings.top_keywords, appendix = ?settings.appendix, "Pipeline ready");
        Self {
            source,
            store,
            gateway,
            sleeper,
            settings,
        }
    }

    /// Run one analysis relative to `today`.
    ///
    /// Fails only when `request` is invalid, before any search or model call.
    #[instrument(level = "info", skip_all, fields(keyword = %request.keyword))]
    pub async fn run(&self, request: AnalysisRequest, today: NaiveDate) -> Result<AnalysisResult, ValidationError> {
        info!(stage = %Stage::Validating, "Validating request");
        let window = match request.validate() {
            Ok(window) => window,
            Err(e) => {
                warn!(stage = %Stage::Aborted, error = %e, "Rejected analysis request");
                return Err(e);
            }
        };
        let mut notices = Vec::new();

        info!(
            stage = %Stage::Crawling,
            total_days = window.total_days(),
            recent_days = window.recent_days(),
            max_pages = request.max_pages,
            "Collecting articles"
        );
        let articles = self.crawl(&request.keyword, window, request.max_pages, today).await;
        if articles.is_empty() {
            notices.push("No articles were collected for the requested period.".to_string());
        }

        info!(stage = %Stage::DetectingTrends, articles = articles.len(), "Detecting trending keywords");
        let detector = TrendDetector::new(window, request.thresholds)
            .with_undated_policy(self.settings.undated)
            .with_tokenizer(Tokenizer::with_extra_stopwords(&self.settings.extra_stopwords));
        let trends = detector.detect(&articles, today);
        info!(count = trends.len(), "Trending keywords detected");
        if trends.is_empty() && !articles.is_empty() {
            notices.push("No keyword met the surge thresholds.".to_string());
        }

        info!(stage = %Stage::ClassifyingKeywords, "Ranking keywords for relevance");
        let ranked_keywords = self
            .gateway
            .classify_relevant_keywords(&trends, &request.perspective)
            .await;
        let displayed = self.select_top_trends(&trends, &ranked_keywords, &mut notices);
        let top_keywords: Vec<String> = displayed.iter().map(|t| t.keyword.clone()).collect();
        info!(top = ?top_keywords, "Top keywords chosen");

        info!(stage = %Stage::SelectingArticles, "Selecting recent articles that mention top keywords");
        let candidates = select_candidates(&detector, &articles, &top_keywords, today);
        info!(count = candidates.len(), "Articles selected for summarization");
        if candidates.is_empty() && !top_keywords.is_empty() {
            notices.push("No recent article mentioned the top keywords.".to_string());
        }

        info!(stage = %Stage::Summarizing, count = candidates.len(), "Summarizing articles");
        let summaries = self.summarize(&candidates).await;
        let failed = summaries.iter().filter(|s| s.content.is_failed()).count();
        if failed > 0 {
            notices.push(format!("{failed} of {} article summaries failed.", summaries.len()));
        }

        info!(stage = %Stage::AggregatingInsights, "Summarizing the trend and its implications");
        let trend_summary = self.gateway.summarize_corpus(&summaries).await;
        if !summaries.is_empty() {
            self.sleeper.sleep(self.settings.throttle.aggregate_delay()).await;
        }
        let implications = self.gateway.infer_domain_implications(&trend_summary).await;
        let appendix = self.appendix(&summaries).await;

        info!(stage = %Stage::AssemblingReport, "Assembling report");
        let report = report::assemble(
            &request.keyword,
            self.gateway.prompts().domain(),
            trend_summary,
            implications,
            displayed,
            appendix,
        );

        info!(stage = %Stage::Done, summaries = summaries.len(), notices = notices.len(), "Analysis finished");
        Ok(AnalysisResult {
            request,
            run_date: today,
            collected: articles.len(),
            trends,
            ranked_keywords,
            top_keywords,
            summaries,
            report,
            notices,
        })
    }

    /// Day by day from the oldest day of the window up to `today`, page by
    /// page until an error or an empty page. Each hit is upserted as it
    /// arrives; a failed write is logged and the article is still used.
    async fn crawl(&self, keyword: &str, window: TrendWindow, max_pages: u32, today: NaiveDate) -> Vec<Article> {
        let mut collected = Vec::new();
        let mut first_request = true;

        for offset in (0..window.total_days()).rev() {
            let date = today - Duration::days(offset as i64);
            for page in 0..max_pages {
                if !first_request {
                    self.sleeper.sleep(self.settings.throttle.page_delay()).await;
                }
                first_request = false;

                let hits = match self.source.search(keyword, date, page).await {
                    Ok(hits) => hits,
                    Err(e) => {
                        warn!(%date, page, error = %e, "Search unit failed; moving to the next day");
                        break;
                    }
                };
                if hits.is_empty() {
                    break;
                }

                for article in &hits {
                    if let Err(e) = self.store.upsert(article).await {
                        warn!(link = %article.link, error = %e, "Could not store article; continuing");
                    }
                }
                collected.extend(hits);
            }
        }

        let before = collected.len();
        let unique: Vec<Article> = collected.into_iter().unique_by(|a| a.link.clone()).collect();
        info!(collected = before, unique = unique.len(), "Collection finished");
        unique
    }

    /// Trends the relevance filter kept, in detector order, cut to the top N.
    /// Falls back to every detected trend when the filter kept nothing.
    fn select_top_trends(&self, trends: &[KeywordTrend], ranked: &[String], notices: &mut Vec<String>) -> Vec<KeywordTrend> {
        if trends.is_empty() {
            return Vec::new();
        }
        let wanted: HashSet<String> = ranked.iter().map(|k| k.to_lowercase()).collect();
        let mut kept: Vec<KeywordTrend> = trends
            .iter()
            .filter(|t| wanted.contains(&t.keyword))
            .cloned()
            .collect();
        if kept.is_empty() {
            warn!("Relevance filter kept no detected keyword; using all trends unranked");
            notices.push("Keyword relevance ranking was unavailable; using all detected trends.".to_string());
            kept = trends.to_vec();
        }
        kept.truncate(self.settings.top_keywords);
        kept
    }

    async fn summarize(&self, candidates: &[Article]) -> Vec<SummarizedArticle> {
        let mut out = Vec::with_capacity(candidates.len());
        for (i, article) in candidates.iter().enumerate() {
            info!(n = i + 1, of = candidates.len(), title = %article.title, "Summarizing article");
            let content = self.gateway.summarize_article(article).await;
            out.push(SummarizedArticle {
                title: article.title.clone(),
                link: article.link.clone(),
                date: article.date_label(),
                content,
            });
            if i + 1 < candidates.len() {
                self.sleeper.sleep(self.settings.throttle.article_delay()).await;
            }
        }
        out
    }

    async fn appendix(&self, summaries: &[SummarizedArticle]) -> ArticleAppendix {
        match self.settings.appendix {
            AppendixMode::Raw => report::raw_entries(summaries, self.settings.preview_chars),
            AppendixMode::Batched if summaries.is_empty() => ArticleAppendix::Batched(Vec::new()),
            AppendixMode::Batched => {
                self.sleeper.sleep(self.settings.throttle.aggregate_delay()).await;
                ArticleAppendix::Batched(
                    self.gateway
                        .summarize_batches(summaries, self.settings.batch_size)
                        .await,
                )
            }
        }
    }
}

/// Recent-window articles whose keywords intersect `top_keywords`, unique by link.
fn select_candidates(detector: &TrendDetector, articles: &[Article], top_keywords: &[String], today: NaiveDate) -> Vec<Article> {
    if top_keywords.is_empty() {
        return Vec::new();
    }
    let top: HashSet<&str> = top_keywords.iter().map(String::as_str).collect();
    articles
        .iter()
        .filter(|a| detector.classify(a, today) == Some(Bucket::Recent))
        .filter(|a| {
            detector
                .tokenizer()
                .keyword_set(&a.keyword_text())
                .iter()
                .any(|k| top.contains(k.as_str()))
        })
        .unique_by(|a| a.link.clone())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Reply, RetryPolicy};
    use crate::models::AiText;
    use crate::config::CorpusSettings;
    use crate::error::{GatewayError, PersistenceError};
    use crate::gateway::NO_ARTICLES;
    use crate::models::StoredArticle;
    use crate::normalize::Normalizer;
    use crate::prompts::PromptBook;
    use crate::storage::SqliteStore;
    use crate::testing::{FakeSource, RecordingSleeper, ScriptedCompletion};
    use serde_json::json;
    use std::time::Duration as StdDuration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    fn days_ago(n: i64) -> NaiveDate {
        today() - Duration::days(n)
    }

    fn request(recent_days: u32, total_days: u32, max_pages: u32) -> AnalysisRequest {
        AnalysisRequest {
            keyword: "전기차".into(),
            total_days,
            recent_days,
            max_pages,
            perspective: "an insurance product developer".into(),
            thresholds: TrendThresholds::default(),
        }
    }

    fn article(title: &str, link: &str, date: NaiveDate) -> Article {
        Article::new(title, format!("https://example.com/{link}"), date, "")
    }

    fn ev_articles() -> Vec<Article> {
        vec![
            article("ev policy news", "1", today()),
            article("ev again", "2", today()),
            article("ev third", "3", today()),
        ]
    }

    fn settings() -> PipelineSettings {
        PipelineSettings::from_config(&AppConfig::default())
    }

    fn pipeline<St: ArticleStore>(
        source: FakeSource,
        store: St,
        client: ScriptedCompletion,
        sleeper: RecordingSleeper,
        settings: PipelineSettings,
    ) -> Pipeline<FakeSource, St, ScriptedCompletion, RecordingSleeper> {
        let gateway = Gateway::new(
            client,
            sleeper.clone(),
            RetryPolicy::default(),
            settings.throttle.clone(),
            CorpusSettings::default(),
            PromptBook::new("Korean", "the automobile insurance industry"),
            Normalizer::default(),
        );
        Pipeline::new(source, store, gateway, sleeper, settings)
    }

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("news.db")).await.unwrap();
        (dir, store)
    }

    struct FailingStore;

    impl ArticleStore for FailingStore {
        async fn upsert(&self, _article: &Article) -> Result<(), PersistenceError> {
            Err(PersistenceError::BadDate { value: "disk full".into() })
        }
        async fn list_all(&self) -> Result<Vec<StoredArticle>, PersistenceError> {
            Ok(Vec::new())
        }
        async fn clear(&self) -> Result<u64, PersistenceError> {
            Ok(0)
        }
        async fn count(&self) -> Result<u64, PersistenceError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_invalid_window_makes_no_calls() {
        let source = FakeSource::default();
        let client = ScriptedCompletion::default();
        let (_dir, store) = temp_store().await;
        let p = pipeline(source.clone(), store, client.clone(), RecordingSleeper::default(), settings());

        let err = p.run(request(5, 5, 3), today()).await.unwrap_err();

        assert_eq!(err, ValidationError::WindowOrder { recent: 5, total: 5 });
        assert!(source.requests().is_empty());
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn test_request_validation() {
        assert_eq!(request(0, 5, 1).validate().unwrap_err(), ValidationError::NotPositive { field: "recent_days", value: 0 });
        assert_eq!(request(1, 5, 0).validate().unwrap_err(), ValidationError::NotPositive { field: "max_pages", value: 0 });
        let mut blank = request(1, 5, 1);
        blank.keyword = "  ".into();
        assert_eq!(blank.validate().unwrap_err(), ValidationError::EmptyKeyword);
        assert_eq!(request(2, 15, 3).validate().unwrap().total_days(), 15);
    }

    #[tokio::test]
    async fn test_full_run() {
        let source = FakeSource::default()
            .page(today(), 0, ev_articles())
            .page(days_ago(3), 0, vec![article("subsidy talk", "4", days_ago(3))]);
        let client = ScriptedCompletion::new(vec![Ok(Reply::Structured(json!(["ev"])))])
            .with_fallback(Ok(Reply::Text("summary text".into())));
        let sleeper = RecordingSleeper::default();
        let (_dir, store) = temp_store().await;
        let p = pipeline(source.clone(), store.clone(), client.clone(), sleeper.clone(), settings());

        let result = p.run(request(1, 5, 2), today()).await.unwrap();

        assert_eq!(result.collected, 4);
        assert_eq!(store.count().await.unwrap(), 4);
        assert_eq!(
            result.trends,
            vec![KeywordTrend {
                keyword: "ev".into(),
                recent_frequency: 3,
                past_frequency: 0,
                surge_ratio: f64::INFINITY,
            }]
        );
        assert_eq!(result.ranked_keywords, vec!["ev"]);
        assert_eq!(result.top_keywords, vec!["ev"]);
        assert_eq!(result.summaries.len(), 3);
        assert!(result.notices.is_empty(), "{:?}", result.notices);
        assert_eq!(result.report.trend_summary.body, AiText::Generated("summary text".into()));
        assert_eq!(result.report.implications.body, AiText::Generated("summary text".into()));
        assert_eq!(result.report.keyword_evidence.len(), 1);

        // classify + 3 articles + corpus + implications
        assert_eq!(client.calls(), 6);
        // 5 first pages plus a second page for the two days with hits
        assert_eq!(source.requests().len(), 7);

        let pauses = sleeper.pauses();
        let count = |d: StdDuration| pauses.iter().filter(|p| **p == d).count();
        assert_eq!(count(StdDuration::from_millis(100)), 2);
        assert_eq!(count(StdDuration::from_secs(1)), 7);
    }

    #[tokio::test]
    async fn test_crawl_error_only_stops_that_day() {
        let source = FakeSource::default()
            .fail(today(), 0, 500)
            .page(days_ago(1), 0, vec![article("a", "1", days_ago(1))]);
        let (_dir, store) = temp_store().await;
        let p = pipeline(
            source.clone(),
            store,
            ScriptedCompletion::default(),
            RecordingSleeper::default(),
            settings(),
        );

        let result = p.run(request(1, 2, 3), today()).await.unwrap();

        assert_eq!(result.collected, 1);
        assert_eq!(
            source.requests(),
            vec![(days_ago(1), 0), (days_ago(1), 1), (today(), 0)]
        );
    }

    #[tokio::test]
    async fn test_classification_failure_falls_back_to_all_trends() {
        let source = FakeSource::default().page(today(), 0, ev_articles());
        let client = ScriptedCompletion::new(vec![Ok(Reply::Text("ev is the answer".into()))])
            .with_fallback(Ok(Reply::Text("ok".into())));
        let (_dir, store) = temp_store().await;
        let p = pipeline(source, store, client, RecordingSleeper::default(), settings());

        let result = p.run(request(1, 5, 1), today()).await.unwrap();

        assert!(result.ranked_keywords.is_empty());
        assert_eq!(result.top_keywords, vec!["ev"]);
        assert_eq!(result.summaries.len(), 3);
        assert!(result.notices.iter().any(|n| n.contains("ranking was unavailable")));
    }

    #[tokio::test]
    async fn test_all_model_failures_still_produce_report() {
        let source = FakeSource::default().page(today(), 0, ev_articles());
        let client = ScriptedCompletion::always(Err(GatewayError::TransportFailure {
            status: Some(500),
            detail: "down".into(),
        }));
        let sleeper = RecordingSleeper::default();
        let (_dir, store) = temp_store().await;
        let p = pipeline(source, store, client.clone(), sleeper.clone(), settings());

        let result = p.run(request(1, 5, 1), today()).await.unwrap();

        assert_eq!(result.summaries.len(), 3);
        assert!(result.summaries.iter().all(|s| s.content.is_failed()));
        assert!(result.report.trend_summary.heading().ends_with("(generation failed)"));
        assert!(result.report.implications.heading().ends_with("(generation failed)"));
        assert!(result.notices.iter().any(|n| n.contains("3 of 3 article summaries failed")));
        // classify and three articles, two attempts each; corpus and implications make no call
        assert_eq!(client.calls(), 8);
        let retry_pauses = sleeper
            .pauses()
            .iter()
            .filter(|d| **d == StdDuration::from_secs(15))
            .count();
        assert_eq!(retry_pauses, 4);
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_stop_run() {
        let source = FakeSource::default().page(today(), 0, ev_articles());
        let client = ScriptedCompletion::new(vec![Ok(Reply::Structured(json!(["ev"])))])
            .with_fallback(Ok(Reply::Text("ok".into())));
        let p = pipeline(source, FailingStore, client, RecordingSleeper::default(), settings());

        let result = p.run(request(1, 5, 1), today()).await.unwrap();

        assert_eq!(result.collected, 3);
        assert_eq!(result.top_keywords, vec!["ev"]);
    }

    #[tokio::test]
    async fn test_no_articles_is_an_empty_result_not_an_error() {
        let client = ScriptedCompletion::default();
        let (_dir, store) = temp_store().await;
        let p = pipeline(FakeSource::default(), store, client.clone(), RecordingSleeper::default(), settings());

        let result = p.run(request(1, 3, 1), today()).await.unwrap();

        assert_eq!(result.collected, 0);
        assert!(result.trends.is_empty());
        assert_eq!(client.calls(), 0);
        assert_eq!(result.report.trend_summary.body, AiText::Failed(NO_ARTICLES.into()));
        assert!(result.notices.iter().any(|n| n.contains("No articles were collected")));
    }

    #[tokio::test]
    async fn test_duplicate_links_are_summarized_once() {
        let mut page_two = ev_articles();
        page_two.truncate(1);
        let source = FakeSource::default()
            .page(today(), 0, ev_articles())
            .page(today(), 1, page_two);
        let client = ScriptedCompletion::new(vec![Ok(Reply::Structured(json!(["ev"])))])
            .with_fallback(Ok(Reply::Text("ok".into())));
        let (_dir, store) = temp_store().await;
        let p = pipeline(source, store, client, RecordingSleeper::default(), settings());

        let result = p.run(request(1, 5, 3), today()).await.unwrap();

        assert_eq!(result.collected, 3);
        assert_eq!(result.summaries.len(), 3);
    }

    #[tokio::test]
    async fn test_batched_appendix() {
        let source = FakeSource::default().page(today(), 0, ev_articles());
        let client = ScriptedCompletion::new(vec![Ok(Reply::Structured(json!(["ev"])))])
            .with_fallback(Ok(Reply::Text("ok".into())));
        let (_dir, store) = temp_store().await;
        let mut s = settings();
        s.appendix = AppendixMode::Batched;
        s.batch_size = 2;
        let p = pipeline(source, store, client.clone(), RecordingSleeper::default(), s);

        let result = p.run(request(1, 5, 1), today()).await.unwrap();

        let ArticleAppendix::Batched(batches) = &result.report.articles else {
            panic!("expected batched appendix");
        };
        assert_eq!(batches.len(), 2);
        // classify + 3 articles + corpus + implications + 2 batches
        assert_eq!(client.calls(), 8);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::ClassifyingKeywords.to_string(), "classifying_keywords");
        assert_eq!(Stage::Done.to_string(), "done");
        assert_eq!(Stage::Idle.to_string(), "idle");
        assert_eq!(Stage::Aborted.to_string(), "aborted");
    }
}
