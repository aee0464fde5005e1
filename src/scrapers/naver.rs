//! Naver News search scraper.
//!
//! Each request asks for a single day (`ds == de`) so every hit can be dated
//! with the searched day. Results come ten per page; `start` is 1, 11, 21...
//!
//! Headlines are `span.sds-comps-text-type-headline1` elements wrapped in the
//! article's `<a href>`. The preview text is the `body1` span of the same
//! result block.

use crate::error::CollectionError;
use crate::models::Article;
use crate::scrapers::NewsSource;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

const SEARCH_ENDPOINT: &str = "https://search.naver.com/search.naver";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36 Edg/138.0.0.0";
const RESULTS_PER_PAGE: u32 = 10;

static HEADLINE: Lazy<Selector> = Lazy::new(|| Selector::parse("span.sds-comps-text-type-headline1").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("span.sds-comps-text-type-body1").unwrap());

#[derive(Debug, Clone)]
pub struct NaverNews {
    client: reqwest::Client,
    endpoint: String,
}

impl NaverNews {
    pub fn new() -> Result<Self, CollectionError> {
        Self::with_endpoint(SEARCH_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, CollectionError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn search_url(&self, keyword: &str, date: NaiveDate, page: u32) -> Result<Url, CollectionError> {
        let day = date.format("%Y.%m.%d");
        let raw = format!(
            "{}?where=news&query={}&sm=tab_opt&sort=0&photo=0&field=0&pd=3&ds={day}&de={day}&start={}",
            self.endpoint,
            urlencoding::encode(keyword),
            page * RESULTS_PER_PAGE + 1
        );
        Ok(Url::parse(&raw)?)
    }
}

impl NewsSource for NaverNews {
    #[instrument(level = "info", skip_all, fields(keyword = %keyword, %date, page))]
    async fn search(&self, keyword: &str, date: NaiveDate, page: u32) -> Result<Vec<Article>, CollectionError> {
        let url = self.search_url(keyword, date, page)?;
        let t0 = Instant::now();

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "Search page returned an error status");
            return Err(CollectionError::Status {
                status: status.as_u16(),
            });
        }
        let html = response.text().await?;

        let articles = parse_results(&html, &url, date);
        info!(
            count = articles.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Parsed search results page"
        );
        Ok(articles)
    }
}

/// Articles on one result page, dated `date`.
///
/// Headlines without an enclosing link, `javascript:` links and ad links are
/// skipped. Relative links are resolved against `page_url`.
pub fn parse_results(html: &str, page_url: &Url, date: NaiveDate) -> Vec<Article> {
    let document = Html::parse_document(html);
    let mut articles = Vec::new();

    for headline in document.select(&HEADLINE) {
        let Some(anchor) = enclosing_anchor(headline) else {
            debug!("Headline without a link; skipping");
            continue;
        };
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.starts_with("javascript:") || href.contains("ad.naver.com") {
            debug!(%href, "Skipping non-article link");
            continue;
        }
        let Ok(link) = page_url.join(href) else {
            warn!(%href, "Unresolvable article link");
            continue;
        };

        let title = element_text(headline);
        if title.is_empty() {
            continue;
        }
        articles.push(Article::new(title, link.to_string(), date, snippet_for(anchor)));
    }
    articles
}

fn enclosing_anchor(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "a")
}

/// Body text of the smallest block around `anchor` that holds only this one headline.
fn snippet_for(anchor: ElementRef<'_>) -> String {
    for block in anchor.ancestors().filter_map(ElementRef::wrap) {
        if block.select(&HEADLINE).count() > 1 {
            break;
        }
        if let Some(body) = block.select(&BODY).next() {
            return element_text(body);
        }
    }
    String::new()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}
