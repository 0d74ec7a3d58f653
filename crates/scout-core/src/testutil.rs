//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::models::{
    CleanedPage, InvalidUrl, ProductInput, RawResult, SearchConfig, ValidatedPage,
    ValidationBatch, ValidationMethod,
};
use crate::traits::{
    CandidateFilter, Cleaner, Fetcher, ImageProbe, Judge, JudgeRequest, JudgeTask, PageValidator,
};
use crate::workflow::{WorkflowEvent, WorkflowReporter};

/// Rebuild an error for repeated playback; `AppError` is not `Clone`.
fn replay(error: &AppError) -> AppError {
    match error {
        AppError::TransientProvider { provider, message } => AppError::TransientProvider {
            provider: *provider,
            message: message.clone(),
        },
        AppError::FatalProvider { provider, message } => AppError::FatalProvider {
            provider: *provider,
            message: message.clone(),
        },
        AppError::Model {
            message,
            status_code,
            retryable,
        } => AppError::Model {
            message: message.clone(),
            status_code: *status_code,
            retryable: *retryable,
        },
        AppError::Timeout(secs) => AppError::Timeout(*secs),
        AppError::Fetch(msg) => AppError::Fetch(msg.clone()),
        AppError::NetworkError(msg) => AppError::NetworkError(msg.clone()),
        other => AppError::HttpError(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// MockSearch
// ---------------------------------------------------------------------------

/// Scripted provider behaviour for one query or config name.
pub enum Scripted {
    Results(Vec<RawResult>),
    Error(AppError),
    Delayed(Duration, Vec<RawResult>),
    Panic,
}

enum Action {
    Return(Vec<RawResult>),
    Fail(AppError),
    Sleep(Duration, Vec<RawResult>),
    Panic,
}

/// Mock search provider. Unscripted searches return no results.
///
/// Scripts are looked up by the rendered query first, then by config name.
#[derive(Clone)]
pub struct MockSearch {
    scripts: Arc<Mutex<HashMap<String, Scripted>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockSearch {
    pub fn empty() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn script(self, key: &str, behaviour: Scripted) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(key.to_string(), behaviour);
        self
    }

    /// Config names of every search call, in call order.
    pub fn call_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, query)| query.clone())
            .collect()
    }
}

impl crate::traits::SearchProvider for MockSearch {
    async fn search(&self, config: &SearchConfig, query: &str) -> Result<Vec<RawResult>, AppError> {
        let name = config.name();
        self.calls
            .lock()
            .unwrap()
            .push((name.clone(), query.to_string()));

        // Resolve under the lock, act after releasing it.
        let action = {
            let scripts = self.scripts.lock().unwrap();
            match scripts.get(query).or_else(|| scripts.get(&name)) {
                None => Action::Return(vec![]),
                Some(Scripted::Results(r)) => Action::Return(r.clone()),
                Some(Scripted::Error(e)) => Action::Fail(replay(e)),
                Some(Scripted::Delayed(d, r)) => Action::Sleep(*d, r.clone()),
                Some(Scripted::Panic) => Action::Panic,
            }
        };

        match action {
            Action::Return(r) => Ok(r),
            Action::Fail(e) => Err(e),
            Action::Sleep(d, r) => {
                tokio::time::sleep(d).await;
                Ok(r)
            }
            Action::Panic => panic!("scripted provider panic for {query}"),
        }
    }
}

// ---------------------------------------------------------------------------
// MockFilter
// ---------------------------------------------------------------------------

/// Mock filter that keeps every raw URL unless an error is queued.
#[derive(Clone)]
pub struct MockFilter {
    error: Arc<Mutex<Option<AppError>>>,
    calls: Arc<Mutex<usize>>,
}

impl MockFilter {
    pub fn passthrough() -> Self {
        Self {
            error: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Fails the first call, then passes through.
    pub fn with_error(error: AppError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl CandidateFilter for MockFilter {
    async fn filter(&self, raw: &[RawResult], _product: &ProductInput) -> Result<Vec<String>, AppError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(raw.iter().map(|r| r.url.clone()).collect())
    }
}

// ---------------------------------------------------------------------------
// MockValidator
// ---------------------------------------------------------------------------

/// Mock validator that accepts a fixed set of URLs and rejects the rest.
#[derive(Clone)]
pub struct MockValidator {
    accepted: Arc<HashSet<String>>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockValidator {
    pub fn accepting<S: AsRef<str>>(urls: &[S]) -> Self {
        Self {
            accepted: Arc::new(urls.iter().map(|u| u.as_ref().to_string()).collect()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn rejecting() -> Self {
        Self::accepting::<&str>(&[])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Every URL handed to the validator, in call order.
    pub fn validated_urls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().flatten().cloned().collect()
    }
}

impl PageValidator for MockValidator {
    async fn validate(
        &self,
        urls: &[String],
        _product: &ProductInput,
        config: &SearchConfig,
    ) -> Result<ValidationBatch, AppError> {
        self.calls.lock().unwrap().push(urls.to_vec());

        let mut batch = ValidationBatch::default();
        for url in urls {
            batch.checked.push(url.clone());
            if self.accepted.contains(url) {
                batch.validated.push(ValidatedPage {
                    url: url.clone(),
                    validation_method: ValidationMethod::for_mode(config.mode),
                    image_urls: vec![format!("{url}/main.jpg")],
                    reasoning: "identifier found".into(),
                    product_description: None,
                    brand: None,
                    weight: None,
                    dimensions: None,
                });
            } else {
                batch
                    .invalid
                    .push(InvalidUrl::new(url.clone(), "identifiers not found"));
            }
        }
        Ok(batch)
    }
}

// ---------------------------------------------------------------------------
// MockJudge
// ---------------------------------------------------------------------------

/// One recorded judge call.
#[derive(Debug, Clone)]
pub struct JudgeCall {
    pub task: JudgeTask,
    pub context: String,
    pub schema_name: String,
}

/// Mock judge returning queued responses, then a fallback.
#[derive(Clone)]
pub struct MockJudge {
    responses: Arc<Mutex<Vec<Result<serde_json::Value, AppError>>>>,
    fallback: Option<serde_json::Value>,
    delay: Duration,
    calls: Arc<Mutex<Vec<JudgeCall>>>,
}

impl MockJudge {
    /// Answers every call with `data`.
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            fallback: Some(data),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<serde_json::Value, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            fallback: None,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<JudgeCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Judge for MockJudge {
    async fn judge(&self, request: JudgeRequest<'_>) -> Result<serde_json::Value, AppError> {
        self.calls.lock().unwrap().push(JudgeCall {
            task: request.task,
            context: request.context.to_string(),
            schema_name: request.schema_name.to_string(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                None
            } else {
                Some(responses.remove(0))
            }
        };
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(data)) => Ok(data.clone()),
            (None, None) => Err(AppError::malformed_response("no scripted response")),
        }
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns queued responses, then a default page.
#[derive(Clone)]
pub struct MockFetcher {
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    default_html: String,
}

impl MockFetcher {
    /// Serves `html` for every call.
    pub fn new(html: &str) -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_html: html.to_string(),
        }
    }

    /// Fails the first call.
    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            default_html: "<html><body>default</body></html>".to_string(),
        }
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, AppError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_html.clone())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockCleaner
// ---------------------------------------------------------------------------

/// Mock cleaner that returns the HTML unchanged as Markdown.
#[derive(Clone)]
pub struct MockCleaner {
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockCleaner {
    pub fn passthrough() -> Self {
        Self {
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl Cleaner for MockCleaner {
    fn clean(&self, html: &str, _base_url: &str) -> Result<CleanedPage, AppError> {
        let mut err = self.error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        Ok(CleanedPage {
            markdown: html.to_string(),
            image_candidates: vec![],
        })
    }
}

// ---------------------------------------------------------------------------
// MockProbe
// ---------------------------------------------------------------------------

/// Mock image probe that rejects a fixed set of URLs.
#[derive(Clone)]
pub struct MockProbe {
    rejected: Arc<HashSet<String>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockProbe {
    pub fn rejecting(urls: &[&str]) -> Self {
        Self {
            rejected: Arc::new(urls.iter().map(|u| u.to_string()).collect()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ImageProbe for MockProbe {
    async fn probe(&self, url: &str) -> Result<bool, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        Ok(!self.rejected.contains(url))
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock workflow reporter that records events as short labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
    steps: Arc<Mutex<Vec<u32>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.events.lock().unwrap().iter().any(|e| e == label)
    }

    /// Step numbers from transition events, in order.
    pub fn steps(&self) -> Vec<u32> {
        self.steps.lock().unwrap().clone()
    }

    pub fn last_transition(&self) -> Option<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|e| e.strip_prefix("transition:").map(str::to_string))
    }
}

impl WorkflowReporter for MockReporter {
    fn report(&self, event: WorkflowEvent<'_>) {
        let label = match &event {
            WorkflowEvent::RunStarted { .. } => "run_started".to_string(),
            WorkflowEvent::Transition { from, to, step, .. } => {
                self.steps.lock().unwrap().push(*step);
                format!("transition:{from}->{to}")
            }
            WorkflowEvent::SearchStarted { config, .. } => format!("search_started:{config}"),
            WorkflowEvent::SearchFailed { config, error, .. } => {
                let kind = if matches!(error, AppError::TransientProvider { .. }) {
                    "transient"
                } else {
                    "fatal"
                };
                format!("search_failed:{config}:{kind}")
            }
            WorkflowEvent::CandidatesFiltered { config, .. } => format!("filtered:{config}"),
            WorkflowEvent::PagesValidated { config, .. } => format!("validated:{config}"),
            WorkflowEvent::ConfigExhausted { config, .. } => format!("exhausted:{config}"),
            WorkflowEvent::StepLimitReached { .. } => "step_limit".to_string(),
            WorkflowEvent::DeadlineExceeded { .. } => "deadline".to_string(),
            WorkflowEvent::RunFinished { .. } => "run_finished".to_string(),
        };
        self.events.lock().unwrap().push(label);
    }
}
