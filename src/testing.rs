//! Test doubles for the pipeline's collaborators: the language model, the
//! pause between calls and the news search.

use crate::api::{Completion, Reply, Sleeper};
use crate::error::{CollectionError, GatewayError};
use crate::models::Article;
use crate::scrapers::NewsSource;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<Reply, GatewayError>>,
    fallback: Option<Result<Reply, GatewayError>>,
    prompts: Vec<(String, bool)>,
}

/// Replays queued replies in order, then the fallback (or a transport
/// failure when there is none). Records every prompt it receives.
#[derive(Clone, Default)]
pub struct ScriptedCompletion {
    script: Arc<Mutex<Script>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<Result<Reply, GatewayError>>) -> Self {
        let script = Script {
            replies: replies.into(),
            ..Script::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    /// Every call answers with `reply`.
    pub fn always(reply: Result<Reply, GatewayError>) -> Self {
        Self::new(Vec::new()).with_fallback(reply)
    }

    pub fn with_fallback(self, reply: Result<Reply, GatewayError>) -> Self {
        self.script.lock().unwrap().fallback = Some(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().prompts.len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.script
            .lock()
            .unwrap()
            .prompts
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// How many calls carried a response schema.
    pub fn structured_calls(&self) -> usize {
        self.script
            .lock()
            .unwrap()
            .prompts
            .iter()
            .filter(|(_, structured)| *structured)
            .count()
    }
}

impl Completion for ScriptedCompletion {
    async fn complete(&self, prompt: &str, schema: Option<&Value>) -> Result<Reply, GatewayError> {
        let mut script = self.script.lock().unwrap();
        script.prompts.push((prompt.to_string(), schema.is_some()));
        if let Some(reply) = script.replies.pop_front() {
            return reply;
        }
        script.fallback.clone().unwrap_or_else(|| {
            Err(GatewayError::TransportFailure {
                status: None,
                detail: "script exhausted".into(),
            })
        })
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    pauses: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

/// Serves canned result pages keyed by `(date, page)`. Unknown units are
/// empty pages; units registered with [`FakeSource::fail`] return an HTTP error.
#[derive(Clone, Default)]
pub struct FakeSource {
    pages: Arc<Mutex<HashMap<(NaiveDate, u32), Result<Vec<Article>, u16>>>>,
    requests: Arc<Mutex<Vec<(NaiveDate, u32)>>>,
}

impl FakeSource {
    pub fn page(self, date: NaiveDate, page: u32, articles: Vec<Article>) -> Self {
        self.pages.lock().unwrap().insert((date, page), Ok(articles));
        self
    }

    pub fn fail(self, date: NaiveDate, page: u32, status: u16) -> Self {
        self.pages.lock().unwrap().insert((date, page), Err(status));
        self
    }

    pub fn requests(&self) -> Vec<(NaiveDate, u32)> {
        self.requests.lock().unwrap().clone()
    }
}

impl NewsSource for FakeSource {
    async fn search(&self, _keyword: &str, date: NaiveDate, page: u32) -> Result<Vec<Article>, CollectionError> {
        self.requests.lock().unwrap().push((date, page));
        match self.pages.lock().unwrap().get(&(date, page)) {
            Some(Ok(articles)) => Ok(articles.clone()),
            Some(Err(status)) => Err(CollectionError::Status { status: *status }),
            None => Ok(Vec::new()),
        }
    }
}
