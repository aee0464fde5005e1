//! News search sources.
//!
//! A source answers one `(keyword, date, page)` search unit at a time. The
//! pipeline drives the day-by-day, page-by-page crawl and decides what an
//! error or an empty page means.
//!
//! # Supported Sources
//!
//! | Source | Module | Method |
//! |--------|--------|--------|
//! | Naver News search | [`naver`] | HTML scraping of the result page |

use crate::error::CollectionError;
use crate::models::Article;
use chrono::NaiveDate;

pub mod naver;

pub trait NewsSource {
    /// Articles published on `date` matching `keyword`, results page `page` (0-based).
    ///
    /// An empty vector means there are no more results for that day.
    async fn search(&self, keyword: &str, date: NaiveDate, page: u32) -> Result<Vec<Article>, CollectionError>;
}
