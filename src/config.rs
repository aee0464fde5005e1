//! Tunables loaded from an optional YAML file.
//!
//! Every section is `#[serde(default)]`, so a file only needs the keys it
//! changes. Command-line flags are applied on top in `main`.
//!
//! ```yaml
//! retry:
//!   max_attempts: 3
//!   delay_secs: 10
//! trends:
//!   min_surge_ratio: 2.0
//!   undated: exclude
//! report:
//!   perspective: "a fleet-insurance underwriter"
//!   appendix: raw
//! normalizer:
//!   extra_preambles:
//!     - pattern: '^\s*as requested,?\s*'
//! ```

use crate::api::RetryPolicy;
use crate::normalize::PreambleRuleConfig;
use crate::report::AppendixMode;
use crate::trends::{TrendThresholds, UndatedPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub retry: RetryPolicy,
    pub throttle: Throttle,
    pub trends: TrendSettings,
    pub corpus: CorpusSettings,
    pub report: ReportSettings,
    pub normalizer: NormalizerSettings,
}

impl AppConfig {
    /// Built-in defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let shown = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: shown.clone(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: shown.clone(),
            source,
        })?;
        info!(path = %shown, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://ai.potens.ai/api/chat".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Pauses between dependent calls. They keep the run under the remote
/// service's per-minute limits and are part of its contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Throttle {
    pub page_delay_ms: u64,
    pub article_delay_ms: u64,
    pub chunk_delay_secs: u64,
    pub batch_delay_ms: u64,
    pub aggregate_delay_ms: u64,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            page_delay_ms: 1_000,
            article_delay_ms: 100,
            chunk_delay_secs: 10,
            batch_delay_ms: 500,
            aggregate_delay_ms: 1_000,
        }
    }
}

impl Throttle {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn article_delay(&self) -> Duration {
        Duration::from_millis(self.article_delay_ms)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_secs(self.chunk_delay_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn aggregate_delay(&self) -> Duration {
        Duration::from_millis(self.aggregate_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendSettings {
    #[serde(flatten)]
    pub thresholds: TrendThresholds,
    /// How many keywords drive article selection after the relevance filter.
    pub top_keywords: usize,
    pub undated: UndatedPolicy,
    pub extra_stopwords: Vec<String>,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            thresholds: TrendThresholds::default(),
            top_keywords: 3,
            undated: UndatedPolicy::default(),
            extra_stopwords: Vec::new(),
        }
    }
}

/// Corpus pre-compression limits, in characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    pub direct_limit_chars: usize,
    pub chunk_chars: usize,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            direct_limit_chars: 1_500,
            chunk_chars: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Persona the relevance filter ranks keywords for.
    pub perspective: String,
    /// Industry the implications section reasons about.
    pub domain: String,
    /// Language the model is asked to answer in.
    pub language: String,
    pub appendix: AppendixMode,
    pub batch_size: usize,
    pub preview_chars: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            perspective: "an insurance product developer at a car insurer".to_string(),
            domain: "the automobile insurance industry".to_string(),
            language: "Korean".to_string(),
            appendix: AppendixMode::default(),
            batch_size: 3,
            preview_chars: 150,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerSettings {
    pub extra_preambles: Vec<PreambleRuleConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.endpoint, "https://ai.potens.ai/api/chat");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.delay_secs, 15);
        assert_eq!(config.trends.thresholds.min_surge_ratio, 1.5);
        assert_eq!(config.trends.thresholds.min_recent_freq, 3);
        assert_eq!(config.trends.top_keywords, 3);
        assert_eq!(config.corpus.direct_limit_chars, 1_500);
        assert_eq!(config.report.batch_size, 3);
        assert_eq!(config.throttle.article_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
retry:
  max_attempts: 4
trends:
  min_surge_ratio: 2.0
  undated: exclude
  extra_stopwords: ["속보"]
report:
  appendix: raw
normalizer:
  extra_preambles:
    - pattern: '^\s*as requested,?\s*'
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.delay_secs, 15);
        assert_eq!(config.trends.thresholds.min_surge_ratio, 2.0);
        assert_eq!(config.trends.thresholds.min_recent_freq, 3);
        assert_eq!(config.trends.undated, UndatedPolicy::Exclude);
        assert_eq!(config.trends.extra_stopwords, vec!["속보".to_string()]);
        assert_eq!(config.report.appendix, AppendixMode::Raw);
        assert_eq!(config.normalizer.extra_preambles.len(), 1);
        assert_eq!(config.api.timeout_secs, 300);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(AppConfig::from_yaml("  \n").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = AppConfig::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { ref path, .. } if path == "/definitely/not/here.yaml"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "throttle:\n  article_delay_ms: 250").unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.throttle.article_delay(), Duration::from_millis(250));
        assert_eq!(config.throttle.chunk_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_yaml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "retry: [not, a, map]").unwrap();
        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
