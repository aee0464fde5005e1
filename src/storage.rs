//! SQLite article store.
//!
//! One table keyed uniquely by `link`. Writes are `INSERT OR REPLACE`, so the
//! last writer wins; there is no transaction spanning a whole run.

use crate::error::PersistenceError;
use crate::models::{Article, StoredArticle};
use chrono::{Local, NaiveDate};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        link TEXT UNIQUE NOT NULL,
        date TEXT NOT NULL,
        content TEXT,
        crawl_timestamp TEXT NOT NULL
    )
    "#,
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Persistence operations the pipeline and the CLI rely on.
pub trait ArticleStore {
    /// Insert, or replace the row with the same link.
    async fn upsert(&self, article: &Article) -> Result<(), PersistenceError>;

    /// Every row, newest date first, then newest crawl first.
    async fn list_all(&self) -> Result<Vec<StoredArticle>, PersistenceError>;

    /// Delete every row; returns how many were removed.
    async fn clear(&self) -> Result<u64, PersistenceError>;

    async fn count(&self) -> Result<u64, PersistenceError>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PersistenceError::Location {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            debug!(migration = i, "Running migration");
            sqlx::query(migration).execute(&pool).await?;
        }

        info!("Article store ready");
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArticleStore for SqliteStore {
    async fn upsert(&self, article: &Article) -> Result<(), PersistenceError> {
        let crawled_at = Local::now().format(TIMESTAMP_FORMAT).to_string();
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO articles (title, link, date, content, crawl_timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.title)
        .bind(&article.link)
        .bind(article.date_label())
        .bind(&article.snippet)
        .bind(crawled_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<StoredArticle>, PersistenceError> {
        let rows = sqlx::query(
            r#"
            SELECT title, link, date, content, crawl_timestamp FROM articles
            ORDER BY date DESC, crawl_timestamp DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut articles = Vec::with_capacity(rows.len());
        for row in rows {
            let date: String = row.try_get("date")?;
            let published = match parse_date(&date) {
                Ok(day) => Some(day),
                Err(e) => {
                    warn!(error = %e, "Keeping stored article without a date");
                    None
                }
            };
            articles.push(StoredArticle {
                article: Article {
                    title: row.try_get("title")?,
                    link: row.try_get("link")?,
                    published,
                    snippet: row.try_get::<Option<String>, _>("content")?.unwrap_or_default(),
                },
                crawled_at: row.try_get("crawl_timestamp")?,
            });
        }
        Ok(articles)
    }

    async fn clear(&self) -> Result<u64, PersistenceError> {
        let result = sqlx::query("DELETE FROM articles").execute(&self.pool).await?;
        info!(deleted = result.rows_affected(), "Cleared article store");
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, PersistenceError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, PersistenceError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| PersistenceError::BadDate {
        value: value.to_string(),
    })
}
