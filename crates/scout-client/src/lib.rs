pub mod cleaner;
pub mod config;
pub mod fetcher;
pub mod image_probe;
pub mod llm;
pub mod net;
pub mod search;

use scout_core::throttle::{Throttle, Throttled};
use scout_core::{AppError, LlmCandidateFilter, LlmPageValidator, Orchestrator, ValidatorConfig};

pub use cleaner::HtmdCleaner;
pub use config::Settings;
pub use fetcher::ReqwestFetcher;
pub use image_probe::ReqwestImageProbe;
pub use llm::OpenAiJudge;
pub use search::{OpenAiWebSearchProvider, ProviderRouter, SerpApiProvider};

pub type LiveSearch = Throttled<ProviderRouter>;
pub type LiveJudge = Throttled<OpenAiJudge>;
pub type LiveValidator = LlmPageValidator<
    Throttled<ReqwestFetcher>,
    HtmdCleaner,
    LiveJudge,
    Throttled<ReqwestImageProbe>,
>;

/// An orchestrator backed by the real providers, judge and fetcher.
pub type LiveOrchestrator = Orchestrator<LiveSearch, LlmCandidateFilter<LiveJudge>, LiveValidator>;

/// Wire every live adapter behind one shared throttle.
pub fn build_orchestrator(settings: &Settings) -> Result<LiveOrchestrator, AppError> {
    let throttle = Throttle::new(settings.throttle_config());

    let serp = SerpApiProvider::new(&settings.serpapi_key)?;
    let web = OpenAiWebSearchProvider::with_base_url(
        &settings.openai_api_key,
        &settings.search_model,
        &settings.base_url,
    )?;
    let search = Throttled::new(ProviderRouter::new(serp, web), throttle.clone());

    let judge = OpenAiJudge::with_base_url(
        &settings.openai_api_key,
        &settings.filter_model,
        &settings.validation_model,
        &settings.base_url,
    )?
    .with_timeout(settings.call_timeout)?;
    let judge = Throttled::new(judge, throttle.clone());

    let fetcher = Throttled::new(
        ReqwestFetcher::with_timeout(settings.call_timeout)?,
        throttle.clone(),
    );
    let probe = Throttled::new(ReqwestImageProbe::new()?, throttle);

    let validator = LlmPageValidator::new(
        fetcher,
        HtmdCleaner::new(),
        judge.clone(),
        probe,
        ValidatorConfig {
            call_timeout: settings.call_timeout,
            ..ValidatorConfig::default()
        },
    );

    tracing::info!(
        filter_model = %settings.filter_model,
        validation_model = %settings.validation_model,
        search_model = %settings.search_model,
        "Orchestrator ready"
    );

    Ok(Orchestrator::new(
        search,
        LlmCandidateFilter::new(judge),
        validator,
        settings.workflow_config(),
    ))
}
