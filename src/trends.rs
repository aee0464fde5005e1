//! Two-window keyword surge detection.
//!
//! Articles are split into a *recent* bucket (the trailing `recent_days`)
//! and a *past* bucket (the rest of the `total_days` horizon). Keyword
//! counts from both buckets are compared; a keyword is trending when it is
//! mentioned at least `min_recent_freq` times recently and either never
//! appeared before (ratio = +infinity) or grew by at least `min_surge_ratio`.
//!
//! Everything here is pure: `today` is passed in, nothing is read from the
//! clock, the network or the store.

use crate::error::ValidationError;
use crate::models::{Article, KeywordTrend};
use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Particles, temporal/attribution filler and outlet names.
static DEFAULT_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Korean particles and connectives
        "은", "는", "이", "가", "을", "를", "와", "과", "도", "만", "고", "에", "의", "한", "그", "저",
        "것", "수", "등", "및", "대한", "통해", "이번", "지난", "다", "있다", "없다", "한다", "된다",
        "밝혔다", "말했다", "했다", "위해", "으로", "에서", "로부터", "까지", "부터", "하여", "에게",
        "처럼", "만큼", "듯이", "보다", "아니라", "아니면", "그리고", "그러나", "하지만", "따라서",
        "때문에", "대해", "관련", "최근", "이날", "오전", "오후", "기자",
        // outlets
        "뉴스", "연합뉴스", "조선비즈", "한겨레", "ytn", "mbn", "뉴시스", "매일경제", "한국경제",
        // English filler
        "the", "an", "and", "or", "of", "to", "in", "on", "for", "with", "by", "at", "from", "as",
        "is", "are", "was", "were", "be", "been", "it", "its", "this", "that", "has", "have", "had",
        "will", "said", "says", "today", "yesterday", "news", "reporter", "reuters", "yonhap",
    ]
    .into_iter()
    .collect()
});

/// Splits `title + snippet` text into candidate keywords.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    extra_stopwords: HashSet<String>,
}

impl Tokenizer {
    pub fn with_extra_stopwords<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extra_stopwords: words.into_iter().map(|w| w.as_ref().to_lowercase()).collect(),
        }
    }

    fn is_stopword(&self, token: &str) -> bool {
        DEFAULT_STOPWORDS.contains(token) || self.extra_stopwords.contains(token)
    }

    /// Keep letters (any script), digits and whitespace; lowercase; split;
    /// drop single-character tokens and stopwords.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let cleaned: String = text
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        cleaned
            .split_whitespace()
            .filter(|token| token.chars().count() > 1)
            .filter(|token| !self.is_stopword(token))
            .map(str::to_string)
            .collect()
    }

    pub fn keyword_set(&self, text: &str) -> HashSet<String> {
        self.tokenize(text).into_iter().collect()
    }
}

/// What to do with an article whose date is missing or unparseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndatedPolicy {
    /// Count it as published today (lands in the recent bucket). Logged.
    #[default]
    TreatAsToday,
    /// Leave it out of both buckets.
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Recent,
    Past,
}

/// A validated `(recent_days, total_days)` pair with `1 <= recent < total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendWindow {
    recent_days: u32,
    total_days: u32,
}

impl TrendWindow {
    pub fn new(recent_days: u32, total_days: u32) -> Result<Self, ValidationError> {
        if recent_days == 0 {
            return Err(ValidationError::NotPositive {
                field: "recent_days",
                value: recent_days,
            });
        }
        if total_days == 0 {
            return Err(ValidationError::NotPositive {
                field: "total_days",
                value: total_days,
            });
        }
        if recent_days >= total_days {
            return Err(ValidationError::WindowOrder {
                recent: recent_days,
                total: total_days,
            });
        }
        Ok(Self {
            recent_days,
            total_days,
        })
    }

    pub fn recent_days(&self) -> u32 {
        self.recent_days
    }

    pub fn total_days(&self) -> u32 {
        self.total_days
    }

    /// Which bucket `date` falls in, relative to the start of `today`.
    ///
    /// Dates after `today` or before `today - total_days` are in neither.
    pub fn bucket(&self, date: NaiveDate, today: NaiveDate) -> Option<Bucket> {
        let recent_start = today - Duration::days(self.recent_days as i64);
        let past_start = today - Duration::days(self.total_days as i64);

        if date > today {
            None
        } else if date >= recent_start {
            Some(Bucket::Recent)
        } else if date >= past_start {
            Some(Bucket::Past)
        } else {
            None
        }
    }
}

/// Detector thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendThresholds {
    pub min_surge_ratio: f64,
    pub min_recent_freq: u32,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        Self {
            min_surge_ratio: 1.5,
            min_recent_freq: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrendDetector {
    window: TrendWindow,
    thresholds: TrendThresholds,
    undated: UndatedPolicy,
    tokenizer: Tokenizer,
}

impl TrendDetector {
    pub fn new(window: TrendWindow, thresholds: TrendThresholds) -> Self {
        Self {
            window,
            thresholds,
            undated: UndatedPolicy::default(),
            tokenizer: Tokenizer::default(),
        }
    }

    pub fn with_undated_policy(mut self, policy: UndatedPolicy) -> Self {
        self.undated = policy;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Bucket for one article, applying the undated policy.
    pub fn classify(&self, article: &Article, today: NaiveDate) -> Option<Bucket> {
        match article.published {
            Some(date) => self.window.bucket(date, today),
            None => match self.undated {
                UndatedPolicy::TreatAsToday => {
                    warn!(title = %article.title, link = %article.link, "Article has no usable date; counting it as published today");
                    Some(Bucket::Recent)
                }
                UndatedPolicy::Exclude => {
                    debug!(link = %article.link, "Skipping undated article");
                    None
                }
            },
        }
    }

    /// Trending keywords, most recent mentions first, ties broken alphabetically.
    pub fn detect(&self, articles: &[Article], today: NaiveDate) -> Vec<KeywordTrend> {
        let mut recent: HashMap<String, u32> = HashMap::new();
        let mut past: HashMap<String, u32> = HashMap::new();

        for article in articles {
            let counts = match self.classify(article, today) {
                Some(Bucket::Recent) => &mut recent,
                Some(Bucket::Past) => &mut past,
                None => continue,
            };
            for token in self.tokenizer.tokenize(&article.keyword_text()) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }

        let mut trends: Vec<KeywordTrend> = recent
            .into_iter()
            .filter_map(|(keyword, recent_frequency)| {
                if recent_frequency < self.thresholds.min_recent_freq {
                    return None;
                }
                let past_frequency = past.get(&keyword).copied().unwrap_or(0);
                let surge_ratio = if past_frequency == 0 {
                    f64::INFINITY
                } else {
                    let ratio = recent_frequency as f64 / past_frequency as f64;
                    if ratio < self.thresholds.min_surge_ratio {
                        return None;
                    }
                    ratio
                };
                Some(KeywordTrend {
                    keyword,
                    recent_frequency,
                    past_frequency,
                    surge_ratio,
                })
            })
            .collect();

        trends.sort_by(|a, b| {
            b.recent_frequency
                .cmp(&a.recent_frequency)
                .then_with(|| a.keyword.cmp(&b.keyword))
        });

        debug!(count = trends.len(), "Detected trending keywords");
        trends
    }
}
