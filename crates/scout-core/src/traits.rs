use std::future::Future;

use crate::error::AppError;
use crate::models::{CleanedPage, ProductInput, RawResult, SearchConfig, ValidationBatch};

/// Runs one search against an external backend.
///
/// Implementations must report failures as [`AppError::TransientProvider`] or
/// [`AppError::FatalProvider`]; the orchestrator classifies anything else
/// through [`AppError::into_provider_error`].
pub trait SearchProvider: Send + Sync + Clone {
    fn search(
        &self,
        config: &SearchConfig,
        query: &str,
    ) -> impl Future<Output = Result<Vec<RawResult>, AppError>> + Send;
}

/// Which pipeline phase a judgment belongs to. Lets adapters pick a model per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeTask {
    Filter,
    Validation,
}

/// A structured-output request to a language model.
#[derive(Debug, Clone, Copy)]
pub struct JudgeRequest<'a> {
    pub task: JudgeTask,
    pub instructions: &'a str,
    pub context: &'a str,
    pub schema_name: &'a str,
    pub schema: &'a serde_json::Value,
}

/// Language-model judgment returning JSON shaped by `request.schema`.
pub trait Judge: Send + Sync + Clone {
    fn judge(
        &self,
        request: JudgeRequest<'_>,
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;
}

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Converts raw HTML into Markdown plus image candidates.
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, html: &str, base_url: &str) -> Result<CleanedPage, AppError>;
}

/// Checks that a URL serves a real image.
pub trait ImageProbe: Send + Sync + Clone {
    fn probe(&self, url: &str) -> impl Future<Output = Result<bool, AppError>> + Send;
}

/// Accepts every image without a network round trip.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProbe;

impl ImageProbe for NullProbe {
    async fn probe(&self, _url: &str) -> Result<bool, AppError> {
        Ok(true)
    }
}

/// Narrows raw search results to plausible candidate URLs.
pub trait CandidateFilter: Send + Sync + Clone {
    fn filter(
        &self,
        raw: &[RawResult],
        product: &ProductInput,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;
}

/// Confirms candidate pages and extracts product data from them.
pub trait PageValidator: Send + Sync + Clone {
    fn validate(
        &self,
        urls: &[String],
        product: &ProductInput,
        config: &SearchConfig,
    ) -> impl Future<Output = Result<ValidationBatch, AppError>> + Send;
}
