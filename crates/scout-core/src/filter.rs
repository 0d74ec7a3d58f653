use std::collections::HashSet;

use serde::Deserialize;

use crate::error::AppError;
use crate::models::{ProductInput, RawResult};
use crate::prompts;
use crate::traits::{CandidateFilter, Judge, JudgeRequest, JudgeTask};

#[derive(Debug, Deserialize)]
struct FilterVerdict {
    urls: Vec<String>,
}

/// Candidate filter backed by a language-model relevance judgment.
///
/// The model's answer is constrained to URLs that appear in the raw results,
/// deduplicated, in the order the model returned them.
#[derive(Clone)]
pub struct LlmCandidateFilter<J: Judge> {
    judge: J,
}

impl<J: Judge> LlmCandidateFilter<J> {
    pub fn new(judge: J) -> Self {
        Self { judge }
    }
}

impl<J: Judge> CandidateFilter for LlmCandidateFilter<J> {
    async fn filter(&self, raw: &[RawResult], product: &ProductInput) -> Result<Vec<String>, AppError> {
        if raw.is_empty() {
            return Ok(vec![]);
        }

        let context = prompts::filter_context(product, raw);
        let schema = prompts::filter_schema();
        let response = self
            .judge
            .judge(JudgeRequest {
                task: JudgeTask::Filter,
                instructions: prompts::FILTER_INSTRUCTIONS,
                context: &context,
                schema_name: prompts::FILTER_SCHEMA_NAME,
                schema: &schema,
            })
            .await?;

        prompts::check_response(&response, &schema)?;
        let verdict: FilterVerdict = serde_json::from_value(response)
            .map_err(|e| AppError::malformed_response(e.to_string()))?;

        let kept = retain_known(verdict.urls, raw);
        tracing::debug!(raw = raw.len(), kept = kept.len(), "Filtered candidates");
        Ok(kept)
    }
}

/// Keep only URLs present in `raw`, first occurrence wins.
fn retain_known(urls: Vec<String>, raw: &[RawResult]) -> Vec<String> {
    let known: HashSet<&str> = raw.iter().map(|r| r.url.as_str()).collect();
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(urls.len());
    for url in urls {
        let url = url.trim().to_string();
        if !known.contains(url.as_str()) {
            tracing::debug!(%url, "Dropping URL not present in search results");
            continue;
        }
        if seen.insert(url.clone()) {
            kept.push(url);
        }
    }
    kept
}
