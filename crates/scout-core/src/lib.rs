pub mod batch;
pub mod error;
pub mod filter;
pub mod models;
pub mod planner;
pub mod prompts;
pub mod state;
pub mod throttle;
pub mod traits;
pub mod validator;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testutil;

pub use batch::{BatchConfig, BatchOutcome, BatchReport, BatchRunner, ErrorRecord};
pub use error::AppError;
pub use filter::LlmCandidateFilter;
pub use models::{
    FinalResult, IdentifierMode, InvalidUrl, ProductFields, ProductInput, Provider, RawResult,
    RunOutcome, SearchConfig, ValidatedPage,
};
pub use traits::{
    CandidateFilter, Cleaner, Fetcher, ImageProbe, Judge, PageValidator, SearchProvider,
};
pub use validator::{LlmPageValidator, ValidatorConfig};
pub use workflow::{Orchestrator, TracingWorkflowReporter, WorkflowConfig, WorkflowReporter};
