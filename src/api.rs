//! Remote language-model calls with bounded retry.
//!
//! # Architecture
//!
//! - [`Completion`]: one prompt in, one [`Reply`] (or [`GatewayError`]) out
//! - [`PotensClient`]: HTTP implementation against the `{prompt} -> {message}` endpoint
//! - [`RetryCompletion`]: decorator that retries any [`Completion`] with a fixed pause
//! - [`Sleeper`]: how pauses happen, so tests can record them instead of waiting
//!
//! # Retry Strategy
//!
//! - `max_attempts` calls in total (default 2)
//! - a fixed `delay_secs` pause between attempts (default 15 s), plus optional jitter
//! - no pause after the last attempt
//! - a missing credential fails on the first attempt
//! - exhaustion is reported as [`GatewayError::RetriesExhausted`] wrapping the last error

use crate::error::GatewayError;
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// A model reply: free text, or the parsed JSON a response schema asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Structured(Value),
}

impl Reply {
    /// Text replies as-is; structured replies re-encoded as JSON.
    pub fn into_text(self) -> String {
        match self {
            Reply::Text(text) => text,
            Reply::Structured(value) => value.to_string(),
        }
    }
}

/// Send one prompt to a language model.
pub trait Completion {
    /// `schema`, when given, asks for a JSON reply shaped like it; the reply
    /// is then parsed and returned as [`Reply::Structured`].
    async fn complete(&self, prompt: &str, schema: Option<&Value>) -> Result<Reply, GatewayError>;
}

/// Blocking pause between dependent calls.
pub trait Sleeper: Clone {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub max_attempts: u32,
    pub delay_secs: u64,
    /// Upper bound of a random extra pause, 0 to disable.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay_secs: 15,
            jitter_ms: 0,
        }
    }
}

impl RetryPolicy {
    fn pause(&self) -> Duration {
        let base = Duration::from_secs(self.delay_secs);
        if self.jitter_ms == 0 {
            return base;
        }
        let jitter_ms: u64 = rng().random_range(0..=self.jitter_ms);
        base + Duration::from_millis(jitter_ms)
    }
}

/// Retries the wrapped [`Completion`] according to a [`RetryPolicy`].
pub struct RetryCompletion<T, S> {
    inner: T,
    sleeper: S,
    policy: RetryPolicy,
}

impl<T, S> RetryCompletion<T, S>
where
    T: Completion,
    S: Sleeper,
{
    pub fn new(inner: T, sleeper: S, policy: RetryPolicy) -> Self {
        Self {
            inner,
            sleeper,
            policy,
        }
    }
}

impl<T, S> fmt::Debug for RetryCompletion<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryCompletion")
            .field("max_attempts", &self.policy.max_attempts)
            .field("delay_secs", &self.policy.delay_secs)
            .field("jitter_ms", &self.policy.jitter_ms)
            .finish()
    }
}

impl<T, S> Completion for RetryCompletion<T, S>
where
    T: Completion,
    S: Sleeper,
{
    #[instrument(level = "info", skip_all)]
    async fn complete(&self, prompt: &str, schema: Option<&Value>) -> Result<Reply, GatewayError> {
        let total_t0 = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            match self.inner.complete(prompt, schema).await {
                Ok(reply) => return Ok(reply),
                Err(e) if !e.is_retryable() => {
                    error!(attempt, error = %e, "complete() failed with a non-retryable error");
                    return Err(e);
                }
                Err(e) => {
                    let elapsed_ms_attempt = attempt_t0.elapsed().as_millis();
                    let elapsed_ms_total = total_t0.elapsed().as_millis();

                    if attempt >= max_attempts {
                        error!(
                            attempt,
                            max = max_attempts,
                            elapsed_ms_attempt,
                            elapsed_ms_total,
                            error = %e,
                            "complete() exhausted retries"
                        );
                        return Err(GatewayError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.policy.pause();
                    warn!(
                        attempt,
                        max = max_attempts,
                        elapsed_ms_attempt,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "complete() attempt failed; pausing before retry"
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    prompt: &'a str,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

/// HTTP client for the `{prompt, generationConfig?} -> {message}` chat endpoint.
#[derive(Clone)]
pub struct PotensClient {
    client: Arc<reqwest::Client>,
    endpoint: String,
    api_key: String,
}

impl PotensClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client: Arc::new(client),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

impl fmt::Debug for PotensClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PotensClient")
            .field("client", &"<reqwest::Client>")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Completion for PotensClient {
    #[instrument(level = "info", skip_all, fields(endpoint = %self.endpoint, structured = schema.is_some()))]
    async fn complete(&self, prompt: &str, schema: Option<&Value>) -> Result<Reply, GatewayError> {
        if self.api_key.trim().is_empty() {
            return Err(GatewayError::MissingCredential);
        }

        let t0 = Instant::now();
        let request = ChatRequest {
            prompt,
            generation_config: schema.map(|response_schema| GenerationConfig {
                response_mime_type: "application/json",
                response_schema,
            }),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let elapsed_ms = t0.elapsed().as_millis();

        if !status.is_success() {
            warn!(elapsed_ms, status = status.as_u16(), body = %truncate_for_log(&body, 300), "API call returned an error status");
            return Err(GatewayError::TransportFailure {
                status: Some(status.as_u16()),
                detail: truncate_for_log(&body, 300),
            });
        }

        debug!(elapsed_ms, bytes = body.len(), "API call succeeded");
        parse_reply(&body, schema.is_some())
    }
}

/// Decode a response body: `{"message": "..."}`, with `message` itself
/// parsed as JSON when a schema was requested.
pub fn parse_reply(body: &str, structured: bool) -> Result<Reply, GatewayError> {
    let envelope: Value = serde_json::from_str(body).map_err(|e| {
        GatewayError::MalformedResponse(format!("body is not JSON ({e}): {}", truncate_for_log(body, 200)))
    })?;

    let message = envelope
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            GatewayError::MalformedResponse(format!(
                "response has no `message` field: {}",
                truncate_for_log(body, 200)
            ))
        })?
        .trim();

    if !structured {
        return Ok(Reply::Text(message.to_string()));
    }

    serde_json::from_str(message)
        .map(Reply::Structured)
        .map_err(|e| {
            GatewayError::MalformedResponse(format!(
                "`message` is not valid JSON ({e}): {}",
                truncate_for_log(message, 200)
            ))
        })
}
