use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::models::{FinalResult, ProductFields, ProductInput};
use crate::traits::{CandidateFilter, PageValidator, SearchProvider};
use crate::workflow::{Orchestrator, TracingWorkflowReporter, WorkflowReporter};

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum runs in progress at once.
    pub concurrency: usize,
    /// Extra attempts for a row whose run aborted or panicked.
    pub item_retries: u32,
    pub retry_pause: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            item_retries: 1,
            retry_pause: Duration::from_secs(1),
        }
    }
}

impl BatchConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_item_retries(mut self, item_retries: u32) -> Self {
        self.item_retries = item_retries;
        self
    }

    pub fn with_retry_pause(mut self, retry_pause: Duration) -> Self {
        self.retry_pause = retry_pause;
        self
    }
}

/// A row that did not produce a complete result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub row: usize,
    pub product: ProductFields,
    pub error: String,
    /// What the last attempt gathered before it was cut short.
    pub partial: Option<FinalResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed(FinalResult),
    Failed(ErrorRecord),
}

impl BatchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, BatchOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// One entry per input row, in input order.
    pub items: Vec<BatchOutcome>,
}

/// Runs one orchestrator per row with bounded concurrency.
///
/// Rows are isolated: a failing, aborted or panicking run becomes an
/// [`ErrorRecord`] in its own slot and never affects siblings.
pub struct BatchRunner<S, FL, V, R = TracingWorkflowReporter>
where
    S: SearchProvider,
    FL: CandidateFilter,
    V: PageValidator,
    R: WorkflowReporter,
{
    orchestrator: Arc<Orchestrator<S, FL, V>>,
    reporter: Arc<R>,
    config: BatchConfig,
}

impl<S, FL, V> BatchRunner<S, FL, V, TracingWorkflowReporter>
where
    S: SearchProvider + 'static,
    FL: CandidateFilter + 'static,
    V: PageValidator + 'static,
{
    pub fn new(orchestrator: Arc<Orchestrator<S, FL, V>>, config: BatchConfig) -> Self {
        Self {
            orchestrator,
            reporter: Arc::new(TracingWorkflowReporter),
            config,
        }
    }
}

impl<S, FL, V, R> BatchRunner<S, FL, V, R>
where
    S: SearchProvider + 'static,
    FL: CandidateFilter + 'static,
    V: PageValidator + 'static,
    R: WorkflowReporter + 'static,
{
    pub fn with_reporter<R2: WorkflowReporter + 'static>(self, reporter: R2) -> BatchRunner<S, FL, V, R2> {
        BatchRunner {
            orchestrator: self.orchestrator,
            reporter: Arc::new(reporter),
            config: self.config,
        }
    }

    pub async fn run(&self, rows: Vec<ProductFields>) -> BatchReport {
        self.run_until_cancelled(rows, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but stops launching rows once `cancel` fires.
    ///
    /// Rows already running finish normally; rows never started are recorded
    /// as failed with error `"cancelled"`.
    pub async fn run_until_cancelled(
        &self,
        rows: Vec<ProductFields>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let total = rows.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut slots: Vec<Option<BatchOutcome>> = (0..total).map(|_| None).collect();
        let mut tasks = JoinSet::new();

        tracing::info!(%total, concurrency = self.config.concurrency, "Batch started");

        for (row, fields) in rows.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                slots[row] = Some(failed(row, fields.clone(), "cancelled", None));
                continue;
            };

            let orchestrator = Arc::clone(&self.orchestrator);
            let reporter = Arc::clone(&self.reporter);
            let config = self.config.clone();
            let fields = fields.clone();
            tasks.spawn(async move {
                let outcome = run_row(orchestrator, reporter, &config, row, fields).await;
                drop(permit);
                (row, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((row, outcome)) => slots[row] = Some(outcome),
                Err(e) => tracing::error!(error = %e, "Batch task failed"),
            }
        }

        let items: Vec<BatchOutcome> = slots
            .into_iter()
            .zip(rows)
            .enumerate()
            .map(|(row, (slot, fields))| {
                slot.unwrap_or_else(|| failed(row, fields, "batch task failed", None))
            })
            .collect();

        let successful = items.iter().filter(|i| i.is_completed()).count();
        let report = BatchReport {
            total,
            successful,
            failed: total - successful,
            items,
        };
        tracing::info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            "Batch finished"
        );
        report
    }
}

async fn run_row<S, FL, V, R>(
    orchestrator: Arc<Orchestrator<S, FL, V>>,
    reporter: Arc<R>,
    config: &BatchConfig,
    row: usize,
    fields: ProductFields,
) -> BatchOutcome
where
    S: SearchProvider + 'static,
    FL: CandidateFilter + 'static,
    V: PageValidator + 'static,
    R: WorkflowReporter + 'static,
{
    let product = match ProductInput::try_from(fields.clone()) {
        Ok(product) => product,
        Err(e) => return failed(row, fields, &e.to_string(), None),
    };

    let mut attempt = 0;
    loop {
        // Each attempt runs in its own task so a panic stays inside this row.
        let run = {
            let orchestrator = Arc::clone(&orchestrator);
            let reporter = Arc::clone(&reporter);
            let product = product.clone();
            tokio::spawn(async move { orchestrator.run_with_reporter(product, &*reporter).await })
        };

        let (error, partial) = match run.await {
            Ok(Ok(result)) => match result.abort_error() {
                None => return BatchOutcome::Completed(result),
                Some(e) => (e.to_string(), Some(result)),
            },
            Ok(Err(e)) => return failed(row, fields, &e.to_string(), None),
            Err(e) => (format!("run panicked: {e}"), None),
        };

        if attempt >= config.item_retries {
            tracing::warn!(%row, %error, "Batch row failed");
            return failed(row, fields, &error, partial);
        }
        attempt += 1;
        tracing::warn!(%row, %error, %attempt, "Batch row failed, retrying");
        tokio::time::sleep(config.retry_pause).await;
    }
}

fn failed(row: usize, product: ProductFields, error: &str, partial: Option<FinalResult>) -> BatchOutcome {
    BatchOutcome::Failed(ErrorRecord {
        row,
        product,
        error: error.to_string(),
        partial,
    })
}
