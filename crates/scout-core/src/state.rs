use std::collections::HashSet;

use uuid::Uuid;

use crate::models::{
    FinalResult, InvalidUrl, ProductInput, RunOutcome, SearchConfig, ValidatedPage,
    ValidationBatch,
};

/// Mutable record of one orchestrator run. Never shared between runs.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub product: ProductInput,
    pub config_queue: Vec<SearchConfig>,
    pub current_index: usize,
    pub retries_on_current: u32,
    /// Every URL examined so far in this run.
    pub candidate_urls: HashSet<String>,
    pub validated_pages: Vec<ValidatedPage>,
    pub invalid_urls: Vec<InvalidUrl>,
    pub search_type: Option<String>,
    pub step_count: u32,
}

impl WorkflowState {
    pub fn new(product: ProductInput, config_queue: Vec<SearchConfig>) -> Self {
        Self {
            product,
            config_queue,
            current_index: 0,
            retries_on_current: 0,
            candidate_urls: HashSet::new(),
            validated_pages: Vec::new(),
            invalid_urls: Vec::new(),
            search_type: None,
            step_count: 0,
        }
    }

    pub fn current_config(&self) -> Option<SearchConfig> {
        self.config_queue.get(self.current_index).copied()
    }

    /// Move on to the next config.
    pub fn advance(&mut self) {
        self.current_index += 1;
        self.retries_on_current = 0;
    }

    /// URLs from `urls` not yet examined in this run, order kept.
    pub fn unseen(&self, urls: Vec<String>) -> Vec<String> {
        urls.into_iter()
            .filter(|u| !self.candidate_urls.contains(u))
            .collect()
    }

    /// Fold one validation pass into the run.
    pub fn record(&mut self, batch: ValidationBatch) {
        self.candidate_urls.extend(batch.checked);
        self.candidate_urls
            .extend(batch.validated.iter().map(|p| p.url.clone()));
        self.candidate_urls
            .extend(batch.invalid.iter().map(|i| i.url.clone()));
        self.validated_pages.extend(batch.validated);
        self.invalid_urls.extend(batch.invalid);
    }

    /// Consume the state into the immutable run result.
    pub fn finalize(self, run_id: Uuid, outcome: RunOutcome) -> FinalResult {
        let mut seen = HashSet::new();
        let invalid_urls: Vec<InvalidUrl> = self
            .invalid_urls
            .into_iter()
            .filter(|i| seen.insert(i.url.clone()))
            .collect();

        FinalResult {
            run_id,
            total_checked: self.candidate_urls.len(),
            total_validated_images: self
                .validated_pages
                .iter()
                .map(|p| p.image_urls.len())
                .sum(),
            product: self.product,
            search_type: self.search_type,
            validated_pages: self.validated_pages,
            invalid_urls,
            outcome,
            step_count: self.step_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdentifierMode, Provider, ValidationMethod};

    fn state() -> WorkflowState {
        WorkflowState::new(
            ProductInput::new("", "ABC-12345", "").unwrap(),
            vec![
                SearchConfig::new(IdentifierMode::Sku, Provider::Google),
                SearchConfig::new(IdentifierMode::Sku, Provider::Yahoo),
            ],
        )
    }

    fn page(url: &str, images: usize) -> ValidatedPage {
        ValidatedPage {
            url: url.into(),
            validation_method: ValidationMethod::Sku,
            image_urls: (0..images).map(|i| format!("{url}/img{i}.jpg")).collect(),
            reasoning: "SKU in title".into(),
            product_description: None,
            brand: None,
            weight: None,
            dimensions: None,
        }
    }

    #[test]
    fn test_advance_resets_retries() {
        let mut s = state();
        s.retries_on_current = 2;
        s.advance();
        assert_eq!(s.current_index, 1);
        assert_eq!(s.retries_on_current, 0);
        assert_eq!(s.current_config().unwrap().provider, Provider::Yahoo);
        s.advance();
        assert!(s.current_config().is_none());
    }

    #[test]
    fn test_unseen_drops_checked_urls() {
        let mut s = state();
        s.record(ValidationBatch {
            checked: vec!["https://a.example/1".into()],
            invalid: vec![InvalidUrl::new("https://a.example/1", "no SKU")],
            ..ValidationBatch::default()
        });
        let fresh = s.unseen(vec!["https://a.example/1".into(), "https://b.example/2".into()]);
        assert_eq!(fresh, vec!["https://b.example/2".to_string()]);
    }

    #[test]
    fn test_finalize_totals_and_dedupes_invalid() {
        let mut s = state();
        s.record(ValidationBatch {
            checked: vec!["https://a.example/1".into()],
            invalid: vec![InvalidUrl::new("https://a.example/1", "first reason")],
            ..ValidationBatch::default()
        });
        s.record(ValidationBatch {
            checked: vec!["https://b.example/2".into(), "https://c.example/3".into()],
            validated: vec![page("https://b.example/2", 3)],
            invalid: vec![
                InvalidUrl::new("https://a.example/1", "second reason"),
                InvalidUrl::new("https://c.example/3", "different variant"),
            ],
        });
        s.step_count = 9;

        let result = s.finalize(Uuid::nil(), RunOutcome::Validated);
        assert_eq!(result.total_checked, 3);
        assert_eq!(result.total_validated_images, 3);
        assert_eq!(result.invalid_urls.len(), 2);
        assert_eq!(result.invalid_urls[0].reasoning, "first reason");
        assert_eq!(result.invalid_urls[1].url, "https://c.example/3");
        assert_eq!(result.step_count, 9);
    }
}
