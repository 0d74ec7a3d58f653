//! The search-fallback state machine.
//!
//! One [`Orchestrator`] run walks the planned config queue:
//!
//! ```text
//! Init -> Dispatch -> Searching -> Filtering -> Validating -> Deciding -> Finalize -> Done
//!            ^           |  ^                                     |
//!            |           +--+ (transient error, retry)            |
//!            +----------------------------------------------------+ (config exhausted)
//! ```
//!
//! The first config that yields a validated page wins. Every transition
//! counts as a step; the run is cut short before it can exceed the step
//! ceiling, and a wall-clock deadline bounds runs stuck on slow I/O. Both
//! still produce a partial [`FinalResult`].

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    FinalResult, InvalidUrl, ProductInput, RawResult, RunOutcome, SearchConfig, ValidatedPage,
    ValidationBatch, ValidationMethod,
};
use crate::planner::{self, PlannerConfig};
use crate::state::WorkflowState;
use crate::traits::{CandidateFilter, PageValidator, SearchProvider};
use crate::validator::filter_image_urls;

/// Transitions still needed after any non-final step: `-> Finalize -> Done`.
const FINISH_STEPS: u32 = 2;

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Retries per config after the first attempt, for transient provider errors.
    pub max_retries: u32,
    /// Maximum transitions per run, including the final two.
    pub step_ceiling: u32,
    /// Budget for each provider search and each filter call.
    pub call_timeout: Duration,
    /// Wall-clock budget for the whole run. Defaults to `call_timeout * step_ceiling`.
    pub run_deadline: Option<Duration>,
    /// Pause before retrying a config.
    pub retry_delay: Duration,
    /// Minimum confidence for a bypassed result to count as validated.
    pub bypass_min_confidence: f32,
    pub planner: PlannerConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            step_ceiling: 100,
            call_timeout: Duration::from_secs(90),
            run_deadline: None,
            retry_delay: Duration::from_secs(1),
            bypass_min_confidence: 0.5,
            planner: PlannerConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_step_ceiling(mut self, step_ceiling: u32) -> Self {
        self.step_ceiling = step_ceiling;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = Some(deadline);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_bypass_min_confidence(mut self, threshold: f32) -> Self {
        self.bypass_min_confidence = threshold;
        self
    }

    pub fn with_min_sku_length(mut self, min_sku_length: usize) -> Self {
        self.planner.min_sku_length = min_sku_length;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.run_deadline.unwrap_or_else(|| {
            self.call_timeout
                .checked_mul(self.step_ceiling)
                .unwrap_or(Duration::MAX)
        })
    }
}

/// Events emitted by the orchestrator for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkflowEvent<'a> {
    RunStarted {
        run_id: Uuid,
        product: &'a ProductInput,
        configs: usize,
    },
    Transition {
        run_id: Uuid,
        from: &'static str,
        to: &'static str,
        step: u32,
    },
    SearchStarted {
        run_id: Uuid,
        config: &'a SearchConfig,
        attempt: u32,
    },
    SearchFailed {
        run_id: Uuid,
        config: &'a SearchConfig,
        error: &'a AppError,
        will_retry: bool,
    },
    CandidatesFiltered {
        run_id: Uuid,
        config: &'a SearchConfig,
        raw: usize,
        kept: usize,
    },
    PagesValidated {
        run_id: Uuid,
        config: &'a SearchConfig,
        validated: usize,
        invalid: usize,
    },
    ConfigExhausted {
        run_id: Uuid,
        config: &'a SearchConfig,
        reason: &'a str,
    },
    StepLimitReached {
        run_id: Uuid,
        steps: u32,
        ceiling: u32,
    },
    DeadlineExceeded {
        run_id: Uuid,
        steps: u32,
    },
    RunFinished {
        run_id: Uuid,
        outcome: &'a RunOutcome,
        pages: usize,
        images: usize,
    },
}

/// Trait for receiving workflow events (decoupled logging).
pub trait WorkflowReporter: Send + Sync {
    fn report(&self, event: WorkflowEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkflowReporter;

impl WorkflowReporter for TracingWorkflowReporter {
    fn report(&self, event: WorkflowEvent<'_>) {
        match event {
            WorkflowEvent::RunStarted {
                run_id,
                product,
                configs,
            } => {
                tracing::info!(
                    %run_id,
                    barcode = product.barcode().unwrap_or_default(),
                    sku = product.sku().unwrap_or_default(),
                    %configs,
                    "Research run started"
                );
            }
            WorkflowEvent::Transition {
                run_id,
                from,
                to,
                step,
            } => {
                tracing::debug!(%run_id, %from, %to, %step, "Transition");
            }
            WorkflowEvent::SearchStarted {
                run_id,
                config,
                attempt,
            } => {
                tracing::info!(%run_id, %config, %attempt, "Searching");
            }
            WorkflowEvent::SearchFailed {
                run_id,
                config,
                error,
                will_retry,
            } => {
                tracing::warn!(%run_id, %config, %error, %will_retry, "Search failed");
            }
            WorkflowEvent::CandidatesFiltered {
                run_id,
                config,
                raw,
                kept,
            } => {
                tracing::info!(%run_id, %config, %raw, %kept, "Candidates filtered");
            }
            WorkflowEvent::PagesValidated {
                run_id,
                config,
                validated,
                invalid,
            } => {
                tracing::info!(%run_id, %config, %validated, %invalid, "Pages validated");
            }
            WorkflowEvent::ConfigExhausted {
                run_id,
                config,
                reason,
            } => {
                tracing::info!(%run_id, %config, %reason, "Config exhausted");
            }
            WorkflowEvent::StepLimitReached {
                run_id,
                steps,
                ceiling,
            } => {
                tracing::warn!(%run_id, %steps, %ceiling, "Step ceiling reached, aborting run");
            }
            WorkflowEvent::DeadlineExceeded { run_id, steps } => {
                tracing::warn!(%run_id, %steps, "Run deadline exceeded, aborting run");
            }
            WorkflowEvent::RunFinished {
                run_id,
                outcome,
                pages,
                images,
            } => {
                tracing::info!(
                    %run_id,
                    outcome = outcome.as_str(),
                    %pages,
                    %images,
                    "Research run finished"
                );
            }
        }
    }
}

enum Phase {
    Init,
    Dispatch,
    Searching(SearchConfig),
    Filtering(SearchConfig, Vec<RawResult>),
    Validating(SearchConfig, Vec<String>),
    Deciding(SearchConfig, ValidationBatch),
    Finalize(RunOutcome),
    Done(RunOutcome),
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Dispatch => "dispatch",
            Phase::Searching(_) => "searching",
            Phase::Filtering(..) => "filtering",
            Phase::Validating(..) => "validating",
            Phase::Deciding(..) => "deciding",
            Phase::Finalize(_) => "finalize",
            Phase::Done(_) => "done",
        }
    }
}

/// Drives one product through search → filter → validate → decide.
///
/// Generic over its collaborators so tests can inject deterministic mocks.
pub struct Orchestrator<S, FL, V>
where
    S: SearchProvider,
    FL: CandidateFilter,
    V: PageValidator,
{
    search: S,
    filter: FL,
    validator: V,
    config: WorkflowConfig,
}

impl<S, FL, V> Orchestrator<S, FL, V>
where
    S: SearchProvider,
    FL: CandidateFilter,
    V: PageValidator,
{
    pub fn new(search: S, filter: FL, validator: V, config: WorkflowConfig) -> Self {
        Self {
            search,
            filter,
            validator,
            config,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Research one product, logging through `tracing`.
    pub async fn run(&self, product: ProductInput) -> Result<FinalResult, AppError> {
        self.run_with_reporter(product, &TracingWorkflowReporter)
            .await
    }

    /// Research one product.
    ///
    /// Only planning errors (`InvalidInput`) are returned as `Err`. Aborted
    /// runs return `Ok` with a partial result; see [`FinalResult::abort_error`].
    pub async fn run_with_reporter<R: WorkflowReporter>(
        &self,
        product: ProductInput,
        reporter: &R,
    ) -> Result<FinalResult, AppError> {
        let queue = planner::plan(&product, &self.config.planner)?;
        let run_id = Uuid::new_v4();
        reporter.report(WorkflowEvent::RunStarted {
            run_id,
            product: &product,
            configs: queue.len(),
        });

        let mut state = WorkflowState::new(product, queue);
        let deadline = Instant::now()
            .checked_add(self.config.deadline())
            .unwrap_or_else(far_future);

        let outcome =
            match tokio::time::timeout_at(deadline, self.drive(run_id, &mut state, reporter)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    reporter.report(WorkflowEvent::DeadlineExceeded {
                        run_id,
                        steps: state.step_count,
                    });
                    RunOutcome::DeadlineExceeded {
                        step_ceiling: self.config.step_ceiling,
                    }
                }
            };

        let result = state.finalize(run_id, outcome);
        reporter.report(WorkflowEvent::RunFinished {
            run_id,
            outcome: &result.outcome,
            pages: result.validated_pages.len(),
            images: result.total_validated_images,
        });
        Ok(result)
    }

    async fn drive<R: WorkflowReporter>(
        &self,
        run_id: Uuid,
        state: &mut WorkflowState,
        reporter: &R,
    ) -> RunOutcome {
        let ceiling = self.config.step_ceiling;
        let mut phase = Phase::Init;

        loop {
            if let Phase::Done(outcome) = phase {
                return outcome;
            }

            let from = phase.name();
            let next = if matches!(phase, Phase::Finalize(_))
                || state.step_count + 1 + FINISH_STEPS <= ceiling
            {
                self.step(run_id, phase, state, reporter).await
            } else {
                self.last_step(run_id, phase, state, reporter).await
            };

            state.step_count += 1;
            reporter.report(WorkflowEvent::Transition {
                run_id,
                from,
                to: next.name(),
                step: state.step_count,
            });
            phase = next;
        }
    }

    /// Evaluate one row of the transition table.
    async fn step<R: WorkflowReporter>(
        &self,
        run_id: Uuid,
        phase: Phase,
        state: &mut WorkflowState,
        reporter: &R,
    ) -> Phase {
        match phase {
            Phase::Init => {
                state.current_index = 0;
                Phase::Dispatch
            }
            Phase::Dispatch => match state.current_config() {
                Some(config) => Phase::Searching(config),
                None => Phase::Finalize(RunOutcome::Exhausted),
            },
            Phase::Searching(config) => self.search_step(run_id, config, state, reporter).await,
            Phase::Filtering(config, raw) => {
                let kept = if raw.is_empty() {
                    vec![]
                } else {
                    self.filter_step(&raw, state).await
                };
                let fresh = state.unseen(kept);
                reporter.report(WorkflowEvent::CandidatesFiltered {
                    run_id,
                    config: &config,
                    raw: raw.len(),
                    kept: fresh.len(),
                });
                if fresh.is_empty() {
                    self.exhaust(run_id, &config, "no candidates", state, reporter)
                } else {
                    Phase::Validating(config, fresh)
                }
            }
            Phase::Validating(config, urls) => {
                let validated = self.validator.validate(&urls, &state.product, &config).await;
                let batch = match validated {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::warn!(%run_id, %config, error = %e, "Validation failed");
                        ValidationBatch {
                            checked: urls,
                            ..ValidationBatch::default()
                        }
                    }
                };
                reporter.report(WorkflowEvent::PagesValidated {
                    run_id,
                    config: &config,
                    validated: batch.validated.len(),
                    invalid: batch.invalid.len(),
                });
                Phase::Deciding(config, batch)
            }
            Phase::Deciding(config, batch) => {
                let success = !batch.validated.is_empty();
                state.record(batch);
                if success {
                    state.search_type = Some(config.mode.to_string());
                    Phase::Finalize(RunOutcome::Validated)
                } else {
                    self.exhaust(run_id, &config, "no validated pages", state, reporter)
                }
            }
            Phase::Finalize(outcome) => Phase::Done(outcome),
            Phase::Done(outcome) => Phase::Done(outcome),
        }
    }

    /// The transition taken when only `-> Finalize -> Done` still fits.
    ///
    /// Moves that finish the run are still taken. Anything else aborts, and
    /// the verdicts of a batch in hand are recorded first.
    async fn last_step<R: WorkflowReporter>(
        &self,
        run_id: Uuid,
        phase: Phase,
        state: &mut WorkflowState,
        reporter: &R,
    ) -> Phase {
        match phase {
            Phase::Dispatch if state.current_config().is_none() => {
                Phase::Finalize(RunOutcome::Exhausted)
            }
            Phase::Deciding(config, batch) => {
                let success = !batch.validated.is_empty();
                state.record(batch);
                if success {
                    state.search_type = Some(config.mode.to_string());
                    Phase::Finalize(RunOutcome::Validated)
                } else {
                    self.abort(run_id, state, reporter)
                }
            }
            // A bypass search can finish the run by itself.
            Phase::Searching(config) if config.bypass_validation => {
                match self.search_step(run_id, config, state, reporter).await {
                    next @ Phase::Finalize(_) => next,
                    _ => self.abort(run_id, state, reporter),
                }
            }
            _ => self.abort(run_id, state, reporter),
        }
    }

    fn abort<R: WorkflowReporter>(
        &self,
        run_id: Uuid,
        state: &WorkflowState,
        reporter: &R,
    ) -> Phase {
        let ceiling = self.config.step_ceiling;
        reporter.report(WorkflowEvent::StepLimitReached {
            run_id,
            steps: state.step_count,
            ceiling,
        });
        Phase::Finalize(RunOutcome::StepLimitExceeded {
            step_ceiling: ceiling,
        })
    }

    async fn search_step<R: WorkflowReporter>(
        &self,
        run_id: Uuid,
        config: SearchConfig,
        state: &mut WorkflowState,
        reporter: &R,
    ) -> Phase {
        let query = config.query(&state.product);
        reporter.report(WorkflowEvent::SearchStarted {
            run_id,
            config: &config,
            attempt: state.retries_on_current + 1,
        });

        let timeout = self.config.call_timeout;
        let result = match tokio::time::timeout(timeout, self.search.search(&config, &query)).await {
            Ok(result) => result.map_err(|e| e.into_provider_error(config.provider)),
            Err(_) => Err(AppError::TransientProvider {
                provider: config.provider,
                message: format!("search timed out after {} seconds", timeout.as_secs()),
            }),
        };

        match result {
            Ok(raw) if config.bypass_validation => self.bypass(run_id, config, raw, state, reporter),
            Ok(raw) => Phase::Filtering(config, raw),
            Err(error) => {
                let will_retry = matches!(error, AppError::TransientProvider { .. })
                    && state.retries_on_current < self.config.max_retries;
                reporter.report(WorkflowEvent::SearchFailed {
                    run_id,
                    config: &config,
                    error: &error,
                    will_retry,
                });
                if will_retry {
                    state.retries_on_current += 1;
                    if !self.config.retry_delay.is_zero() {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                    Phase::Searching(config)
                } else {
                    self.exhaust(run_id, &config, "search failed", state, reporter)
                }
            }
        }
    }

    async fn filter_step(&self, raw: &[RawResult], state: &WorkflowState) -> Vec<String> {
        let call = self.filter.filter(raw, &state.product);
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(Ok(urls)) => urls,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Candidate filter failed, treating as no results");
                vec![]
            }
            Err(_) => {
                tracing::warn!("Candidate filter timed out, treating as no results");
                vec![]
            }
        }
    }

    /// Accept self-validated provider results that clear the confidence bar.
    fn bypass<R: WorkflowReporter>(
        &self,
        run_id: Uuid,
        config: SearchConfig,
        raw: Vec<RawResult>,
        state: &mut WorkflowState,
        reporter: &R,
    ) -> Phase {
        let threshold = self.config.bypass_min_confidence;
        let mut batch = ValidationBatch::default();

        for result in raw {
            if state.candidate_urls.contains(&result.url)
                || batch.checked.contains(&result.url)
            {
                continue;
            }
            batch.checked.push(result.url.clone());
            let confidence = result.confidence.unwrap_or(0.0);
            let images = filter_image_urls(result.image_urls, usize::MAX);

            if images.is_empty() {
                batch
                    .invalid
                    .push(InvalidUrl::new(result.url, "no usable images reported"));
            } else if confidence < threshold {
                batch.invalid.push(InvalidUrl::new(
                    result.url,
                    format!("confidence {confidence:.2} below threshold {threshold:.2}"),
                ));
            } else {
                batch.validated.push(ValidatedPage {
                    url: result.url,
                    validation_method: ValidationMethod::for_mode(config.mode),
                    image_urls: images,
                    reasoning: format!(
                        "accepted from {config} without separate validation (confidence {confidence:.2})"
                    ),
                    product_description: None,
                    brand: None,
                    weight: None,
                    dimensions: None,
                });
            }
        }

        reporter.report(WorkflowEvent::PagesValidated {
            run_id,
            config: &config,
            validated: batch.validated.len(),
            invalid: batch.invalid.len(),
        });

        let success = !batch.validated.is_empty();
        state.record(batch);
        if success {
            state.search_type = Some(config.mode.to_string());
            Phase::Finalize(RunOutcome::Validated)
        } else {
            self.exhaust(run_id, &config, "no confident results", state, reporter)
        }
    }

    fn exhaust<R: WorkflowReporter>(
        &self,
        run_id: Uuid,
        config: &SearchConfig,
        reason: &str,
        state: &mut WorkflowState,
        reporter: &R,
    ) -> Phase {
        reporter.report(WorkflowEvent::ConfigExhausted {
            run_id,
            config,
            reason,
        });
        state.advance();
        Phase::Dispatch
    }
}

// Roughly 30 years out, matching what tokio uses for an unbounded sleep.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;
    use crate::testutil::{MockFilter, MockReporter, MockSearch, MockValidator, Scripted};

    fn product() -> ProductInput {
        ProductInput::new("012345678905", "ABC-12345", "Blue Widget").unwrap()
    }

    fn fast_config() -> WorkflowConfig {
        WorkflowConfig::default().with_retry_delay(Duration::ZERO)
    }

    fn transient(provider: Provider) -> AppError {
        AppError::TransientProvider {
            provider,
            message: "HTTP 503".into(),
        }
    }

    fn hit(url: &str) -> RawResult {
        RawResult::new(url, "snippet")
    }

    #[tokio::test]
    async fn test_success_short_circuits_at_second_config() {
        let search = MockSearch::empty()
            .script("barcode_google", Scripted::Results(vec![hit("https://a.example/1")]))
            .script("barcode_yahoo", Scripted::Results(vec![hit("https://b.example/2")]));
        let filter = MockFilter::passthrough();
        let validator = MockValidator::accepting(&["https://b.example/2"]);
        let orchestrator =
            Orchestrator::new(search.clone(), filter.clone(), validator.clone(), fast_config());

        let result = orchestrator.run(product()).await.unwrap();

        assert_eq!(result.outcome, RunOutcome::Validated);
        assert_eq!(result.search_type.as_deref(), Some("barcode"));
        assert_eq!(
            search.call_names(),
            vec!["barcode_google".to_string(), "barcode_yahoo".to_string()]
        );
        assert_eq!(result.validated_pages.len(), 1);
        assert_eq!(result.validated_pages[0].url, "https://b.example/2");
        assert_eq!(result.invalid_urls.len(), 1);
        assert_eq!(result.invalid_urls[0].url, "https://a.example/1");
        assert_eq!(result.total_checked, 2);
        assert!(result.total_validated_images > 0);
        assert!(result.abort_error().is_none());
    }

    #[tokio::test]
    async fn test_retry_bound_for_always_transient_provider() {
        let search = MockSearch::empty().script(
            "barcode_google",
            Scripted::Error(transient(Provider::Google)),
        );
        let orchestrator = Orchestrator::new(
            search.clone(),
            MockFilter::passthrough(),
            MockValidator::rejecting(),
            fast_config().with_max_retries(3),
        );

        let result = orchestrator.run(product()).await.unwrap();

        let names = search.call_names();
        let google_calls = names.iter().filter(|n| *n == "barcode_google").count();
        assert_eq!(google_calls, 4, "one attempt plus exactly three retries");
        assert_eq!(names[4], "barcode_yahoo");
        assert_eq!(result.outcome, RunOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_fatal_error_advances_without_retry() {
        let search = MockSearch::empty().script(
            "barcode_google",
            Scripted::Error(AppError::FatalProvider {
                provider: Provider::Google,
                message: "HTTP 401".into(),
            }),
        );
        let orchestrator = Orchestrator::new(
            search.clone(),
            MockFilter::passthrough(),
            MockValidator::rejecting(),
            fast_config(),
        );

        orchestrator.run(product()).await.unwrap();

        let names = search.call_names();
        assert_eq!(names[0], "barcode_google");
        assert_eq!(names[1], "barcode_yahoo");
    }

    #[tokio::test]
    async fn test_unclassified_errors_are_folded() {
        // A non-provider error that is retryable counts as transient.
        let search = MockSearch::empty().script("barcode_google", Scripted::Error(AppError::Timeout(5)));
        let orchestrator = Orchestrator::new(
            search.clone(),
            MockFilter::passthrough(),
            MockValidator::rejecting(),
            fast_config().with_max_retries(1),
        );

        orchestrator.run(product()).await.unwrap();

        let names = search.call_names();
        assert_eq!(names[..3], ["barcode_google", "barcode_google", "barcode_yahoo"]);
    }

    #[tokio::test]
    async fn test_search_timeout_is_transient() {
        let search = MockSearch::empty().script(
            "barcode_google",
            Scripted::Delayed(Duration::from_millis(200), vec![hit("https://a.example/1")]),
        );
        let orchestrator = Orchestrator::new(
            search.clone(),
            MockFilter::passthrough(),
            MockValidator::rejecting(),
            fast_config()
                .with_max_retries(0)
                .with_call_timeout(Duration::from_millis(20)),
        );
        let reporter = MockReporter::new();

        let result = orchestrator
            .run_with_reporter(product(), &reporter)
            .await
            .unwrap();

        assert!(reporter.contains("search_failed:barcode_google:transient"));
        assert_eq!(result.outcome, RunOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_empty_result() {
        let search = MockSearch::empty();
        let filter = MockFilter::passthrough();
        let validator = MockValidator::rejecting();
        let orchestrator =
            Orchestrator::new(search.clone(), filter.clone(), validator.clone(), fast_config());

        let result = orchestrator.run(product()).await.unwrap();

        assert_eq!(result.outcome, RunOutcome::Exhausted);
        assert_eq!(result.total_validated_images, 0);
        assert!(result.validated_pages.is_empty());
        assert!(result.search_type.is_none());
        assert_eq!(search.call_names().len(), 8);
        // Empty raw results never reach the filter or the validator.
        assert_eq!(filter.call_count(), 0);
        assert_eq!(validator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_filter_failure_degrades_to_no_results() {
        let search = MockSearch::empty()
            .script("barcode_google", Scripted::Results(vec![hit("https://a.example/1")]));
        let filter = MockFilter::with_error(AppError::malformed_response("not json"));
        let validator = MockValidator::accepting(&["https://a.example/1"]);
        let orchestrator =
            Orchestrator::new(search.clone(), filter.clone(), validator.clone(), fast_config());

        let result = orchestrator.run(product()).await.unwrap();

        assert_eq!(filter.call_count(), 1);
        assert_eq!(validator.call_count(), 0);
        assert_eq!(search.call_names()[1], "barcode_yahoo");
        assert_eq!(result.outcome, RunOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_already_checked_urls_are_not_revalidated() {
        let same = vec![hit("https://a.example/1")];
        let search = MockSearch::empty()
            .script("barcode_google", Scripted::Results(same.clone()))
            .script("barcode_yahoo", Scripted::Results(same));
        let validator = MockValidator::rejecting();
        let orchestrator = Orchestrator::new(
            search,
            MockFilter::passthrough(),
            validator.clone(),
            fast_config(),
        );

        let result = orchestrator.run(product()).await.unwrap();

        assert_eq!(validator.call_count(), 1);
        assert_eq!(result.invalid_urls.len(), 1);
        assert_eq!(result.total_checked, 1);
    }

    #[tokio::test]
    async fn test_bypass_skips_filter_and_validator() {
        let search = MockSearch::empty().script(
            "all_fields_openai",
            Scripted::Results(vec![
                RawResult::new("https://shop.example/p/1", "")
                    .with_images(vec!["https://shop.example/img/1.jpg".into()])
                    .with_confidence(0.9),
            ]),
        );
        let filter = MockFilter::passthrough();
        let validator = MockValidator::rejecting();
        let orchestrator =
            Orchestrator::new(search, filter.clone(), validator.clone(), fast_config());

        let result = orchestrator
            .run(ProductInput::new("", "", "Blue Widget").unwrap())
            .await
            .unwrap();

        assert_eq!(filter.call_count(), 0);
        assert_eq!(validator.call_count(), 0);
        assert_eq!(result.outcome, RunOutcome::Validated);
        assert_eq!(result.search_type.as_deref(), Some("all_fields"));
        let page = &result.validated_pages[0];
        assert_eq!(page.validation_method, ValidationMethod::AllFieldsSearch);
        assert_eq!(page.image_urls, vec!["https://shop.example/img/1.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_bypass_respects_confidence_threshold() {
        let search = MockSearch::empty().script(
            "all_fields_openai",
            Scripted::Results(vec![
                RawResult::new("https://low.example/p", "")
                    .with_images(vec!["https://low.example/img/1.jpg".into()])
                    .with_confidence(0.2),
                RawResult::new("https://none.example/p", "")
                    .with_images(vec!["https://none.example/img/1.jpg".into()]),
                RawResult::new("https://noimg.example/p", "").with_confidence(0.99),
            ]),
        );
        let orchestrator = Orchestrator::new(
            search,
            MockFilter::passthrough(),
            MockValidator::rejecting(),
            fast_config(),
        );

        let result = orchestrator
            .run(ProductInput::new("", "", "Blue Widget").unwrap())
            .await
            .unwrap();

        assert_eq!(result.outcome, RunOutcome::Exhausted);
        assert!(result.validated_pages.is_empty());
        assert_eq!(result.invalid_urls.len(), 3);
        assert!(result.invalid_urls[0].reasoning.contains("below threshold"));
    }

    #[tokio::test]
    async fn test_step_ceiling_bounds_run() {
        let search = MockSearch::empty()
            .script("barcode_google", Scripted::Error(transient(Provider::Google)));
        let reporter = MockReporter::new();
        let orchestrator = Orchestrator::new(
            search,
            MockFilter::passthrough(),
            MockValidator::rejecting(),
            fast_config().with_max_retries(100).with_step_ceiling(10),
        );

        let result = orchestrator
            .run_with_reporter(product(), &reporter)
            .await
            .unwrap();

        assert_eq!(
            result.outcome,
            RunOutcome::StepLimitExceeded { step_ceiling: 10 }
        );
        assert!(result.step_count <= 10);
        assert!(matches!(
            result.abort_error(),
            Some(AppError::RecursionLimitExceeded { ceiling: 10, .. })
        ));

        let steps = reporter.steps();
        assert_eq!(steps.len() as u32, result.step_count);
        assert!(steps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(reporter.last_transition().as_deref(), Some("finalize->done"));
    }

    #[tokio::test]
    async fn test_step_ceiling_keeps_partial_results() {
        let search = MockSearch::empty()
            .script("barcode_google", Scripted::Results(vec![hit("https://a.example/1")]))
            .script("barcode_yahoo", Scripted::Error(transient(Provider::Yahoo)));
        let orchestrator = Orchestrator::new(
            search,
            MockFilter::passthrough(),
            MockValidator::rejecting(),
            fast_config().with_max_retries(100).with_step_ceiling(12),
        );

        let result = orchestrator.run(product()).await.unwrap();

        assert!(result.outcome.is_aborted());
        assert_eq!(result.invalid_urls.len(), 1);
        assert_eq!(result.total_checked, 1);
    }

    #[tokio::test]
    async fn test_deadline_returns_partial_result() {
        let search = MockSearch::empty()
            .script("barcode_google", Scripted::Results(vec![hit("https://a.example/1")]))
            .script(
                "barcode_yahoo",
                Scripted::Delayed(Duration::from_secs(5), vec![]),
            );
        let orchestrator = Orchestrator::new(
            search,
            MockFilter::passthrough(),
            MockValidator::rejecting(),
            fast_config().with_run_deadline(Duration::from_millis(100)),
        );

        let result = orchestrator.run(product()).await.unwrap();

        assert_eq!(
            result.outcome,
            RunOutcome::DeadlineExceeded { step_ceiling: 100 }
        );
        assert_eq!(result.invalid_urls[0].url, "https://a.example/1");
    }

    #[tokio::test]
    async fn test_step_count_for_direct_success() {
        let search = MockSearch::empty()
            .script("sku_google", Scripted::Results(vec![hit("https://a.example/1")]));
        let orchestrator = Orchestrator::new(
            search,
            MockFilter::passthrough(),
            MockValidator::accepting(&["https://a.example/1"]),
            fast_config(),
        );

        let result = orchestrator
            .run(ProductInput::new("", "ABC-12345", "").unwrap())
            .await
            .unwrap();

        // init, dispatch, searching, filtering, validating, deciding, finalize, done
        assert_eq!(result.step_count, 7);
        assert_eq!(result.search_type.as_deref(), Some("sku"));
    }

    #[tokio::test]
    async fn test_success_finishing_exactly_at_ceiling() {
        let search = MockSearch::empty()
            .script("sku_google", Scripted::Results(vec![hit("https://a.example/1")]));
        let validator = MockValidator::accepting(&["https://a.example/1"]);
        let reporter = MockReporter::new();
        let orchestrator = Orchestrator::new(
            search,
            MockFilter::passthrough(),
            validator.clone(),
            fast_config().with_step_ceiling(7),
        );

        let result = orchestrator
            .run_with_reporter(ProductInput::new("", "ABC-12345", "").unwrap(), &reporter)
            .await
            .unwrap();

        assert_eq!(result.outcome, RunOutcome::Validated);
        assert_eq!(result.step_count, 7);
        assert_eq!(result.validated_pages.len(), 1);
        assert_eq!(result.total_checked, 1);
        assert_eq!(result.search_type.as_deref(), Some("sku"));
        assert_eq!(validator.call_count(), 1);
        assert!(!reporter.contains("step_limit"));
    }

    #[tokio::test]
    async fn test_abort_after_validation_keeps_verdicts() {
        let search = MockSearch::empty()
            .script("sku_google", Scripted::Results(vec![hit("https://a.example/1")]));
        let reporter = MockReporter::new();
        let orchestrator = Orchestrator::new(
            search,
            MockFilter::passthrough(),
            MockValidator::rejecting(),
            fast_config().with_step_ceiling(7),
        );

        let result = orchestrator
            .run_with_reporter(ProductInput::new("", "ABC-12345", "").unwrap(), &reporter)
            .await
            .unwrap();

        assert_eq!(result.outcome, RunOutcome::StepLimitExceeded { step_ceiling: 7 });
        assert_eq!(result.step_count, 7);
        assert_eq!(result.invalid_urls.len(), 1);
        assert_eq!(result.invalid_urls[0].url, "https://a.example/1");
        assert_eq!(result.total_checked, 1);
        assert!(result.search_type.is_none());
        assert!(reporter.contains("step_limit"));
    }

    #[tokio::test]
    async fn test_one_step_short_aborts_before_validation() {
        let search = MockSearch::empty()
            .script("sku_google", Scripted::Results(vec![hit("https://a.example/1")]));
        let validator = MockValidator::accepting(&["https://a.example/1"]);
        let orchestrator = Orchestrator::new(
            search,
            MockFilter::passthrough(),
            validator.clone(),
            fast_config().with_step_ceiling(6),
        );

        let result = orchestrator
            .run(ProductInput::new("", "ABC-12345", "").unwrap())
            .await
            .unwrap();

        assert_eq!(result.outcome, RunOutcome::StepLimitExceeded { step_ceiling: 6 });
        assert!(result.step_count <= 6);
        assert_eq!(validator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_bypass_success_fits_tight_ceiling() {
        let search = MockSearch::empty().script(
            "all_fields_openai",
            Scripted::Results(vec![
                RawResult::new("https://shop.example/p/1", "")
                    .with_images(vec!["https://shop.example/img/1.jpg".into()])
                    .with_confidence(0.9),
            ]),
        );
        let orchestrator = Orchestrator::new(
            search,
            MockFilter::passthrough(),
            MockValidator::rejecting(),
            fast_config().with_step_ceiling(4),
        );

        // A short SKU alone plans only the bypass config.
        let result = orchestrator
            .run(ProductInput::new("", "ABC", "").unwrap())
            .await
            .unwrap();

        assert_eq!(result.outcome, RunOutcome::Validated);
        assert_eq!(result.step_count, 4);
        assert_eq!(result.search_type.as_deref(), Some("all_fields"));
    }

    #[test]
    fn test_default_deadline_derives_from_ceiling() {
        let config = WorkflowConfig::default()
            .with_call_timeout(Duration::from_secs(2))
            .with_step_ceiling(10);
        assert_eq!(config.deadline(), Duration::from_secs(20));
        let config = config.with_run_deadline(Duration::from_secs(3));
        assert_eq!(config.deadline(), Duration::from_secs(3));
    }

    #[test]
    fn test_workflow_config_defaults() {
        let config = WorkflowConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.step_ceiling, 100);
        assert_eq!(config.call_timeout, Duration::from_secs(90));
        assert_eq!(config.planner.min_sku_length, 5);
    }
}
