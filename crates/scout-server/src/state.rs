use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use scout_core::{
    AppError, BatchConfig, BatchReport, BatchRunner, CandidateFilter, FinalResult, Orchestrator,
    PageValidator, ProductFields, ProductInput, SearchProvider,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Research operations the HTTP layer needs, object-safe so the router is not
/// generic over the orchestrator's collaborators.
pub trait ResearchService: Send + Sync {
    fn research(&self, product: ProductInput) -> BoxFuture<'_, Result<FinalResult, AppError>>;

    fn batch(&self, rows: Vec<ProductFields>, concurrency: usize) -> BoxFuture<'_, BatchReport>;
}

/// [`ResearchService`] backed by a shared [`Orchestrator`].
pub struct OrchestratorService<S, FL, V>
where
    S: SearchProvider,
    FL: CandidateFilter,
    V: PageValidator,
{
    orchestrator: Arc<Orchestrator<S, FL, V>>,
}

impl<S, FL, V> OrchestratorService<S, FL, V>
where
    S: SearchProvider,
    FL: CandidateFilter,
    V: PageValidator,
{
    pub fn new(orchestrator: Arc<Orchestrator<S, FL, V>>) -> Self {
        Self { orchestrator }
    }
}

impl<S, FL, V> ResearchService for OrchestratorService<S, FL, V>
where
    S: SearchProvider + 'static,
    FL: CandidateFilter + 'static,
    V: PageValidator + 'static,
{
    fn research(&self, product: ProductInput) -> BoxFuture<'_, Result<FinalResult, AppError>> {
        Box::pin(self.orchestrator.run(product))
    }

    fn batch(&self, rows: Vec<ProductFields>, concurrency: usize) -> BoxFuture<'_, BatchReport> {
        let runner = BatchRunner::new(
            Arc::clone(&self.orchestrator),
            BatchConfig::default().with_concurrency(concurrency),
        );
        Box::pin(async move { runner.run(rows).await })
    }
}

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub service: Arc<dyn ResearchService>,
    /// Bearer token required on `/v1/*` routes.
    pub api_key: String,
}
