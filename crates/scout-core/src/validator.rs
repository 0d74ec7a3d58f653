use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::AppError;
use crate::models::{
    Dimensions, InvalidUrl, ProductInput, SearchConfig, ValidatedPage, ValidationBatch,
    ValidationMethod, Weight,
};
use crate::prompts;
use crate::traits::{Cleaner, Fetcher, ImageProbe, Judge, JudgeRequest, JudgeTask, PageValidator};

/// Path fragments that mark non-product imagery.
const NON_PRODUCT_MARKERS: &[&str] = &[
    "thumb",
    "icon",
    "logo",
    "sprite",
    "banner",
    "placeholder",
    "spacer",
    "1x1",
];

const NON_PRODUCT_EXTENSIONS: &[&str] = &[".svg", ".gif"];

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Candidates beyond this many are ignored.
    pub max_candidates: usize,
    /// Stop checking further candidates once one page validates.
    pub stop_after_first_valid: bool,
    /// Cleaned page content is truncated to this many characters.
    pub max_content_chars: usize,
    pub max_images_per_page: usize,
    /// Budget for each fetch and each judgment.
    pub call_timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            stop_after_first_valid: false,
            max_content_chars: 60_000,
            max_images_per_page: 12,
            call_timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PageVerdict {
    is_valid: bool,
    validation_method: String,
    reasoning: String,
    image_urls: Vec<String>,
    product_description: Option<String>,
    brand: Option<String>,
    weight: Option<WeightVerdict>,
    dimensions: Option<DimensionsVerdict>,
}

#[derive(Debug, Deserialize)]
struct WeightVerdict {
    value: Option<f64>,
    unit_of_measure: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DimensionsVerdict {
    length: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
}

enum PageOutcome {
    Valid(ValidatedPage),
    Invalid(String),
}

/// Page validator: fetch → clean → judge → image cleanup, one candidate at a time.
///
/// Every failure on a single page becomes an [`InvalidUrl`]; `validate` itself
/// only errors if nothing could be attempted.
#[derive(Clone)]
pub struct LlmPageValidator<F, C, J, P>
where
    F: Fetcher,
    C: Cleaner,
    J: Judge,
    P: ImageProbe,
{
    fetcher: F,
    cleaner: C,
    judge: J,
    probe: P,
    config: ValidatorConfig,
}

impl<F, C, J, P> LlmPageValidator<F, C, J, P>
where
    F: Fetcher,
    C: Cleaner,
    J: Judge,
    P: ImageProbe,
{
    pub fn new(fetcher: F, cleaner: C, judge: J, probe: P, config: ValidatorConfig) -> Self {
        Self {
            fetcher,
            cleaner,
            judge,
            probe,
            config,
        }
    }

    async fn check_page(
        &self,
        url: &str,
        product: &ProductInput,
        search: &SearchConfig,
    ) -> Result<PageOutcome, AppError> {
        let timeout = self.config.call_timeout;

        let html = match tokio::time::timeout(timeout, self.fetcher.fetch(url)).await {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => return Ok(PageOutcome::Invalid(format!("page unreachable: {e}"))),
            Err(_) => {
                let e = AppError::ValidationTimeout(timeout.as_secs());
                return Ok(PageOutcome::Invalid(format!("page unreachable: {e}")));
            }
        };

        let mut page = match self.cleaner.clean(&html, url) {
            Ok(page) => page,
            Err(e) => return Ok(PageOutcome::Invalid(format!("page unreadable: {e}"))),
        };
        truncate_chars(&mut page.markdown, self.config.max_content_chars);

        let context = prompts::page_context(product, url, &page);
        let schema = prompts::page_schema();
        let request = JudgeRequest {
            task: JudgeTask::Validation,
            instructions: prompts::PAGE_INSTRUCTIONS,
            context: &context,
            schema_name: prompts::PAGE_SCHEMA_NAME,
            schema: &schema,
        };
        let response = match tokio::time::timeout(timeout, self.judge.judge(request)).await {
            Ok(result) => result?,
            Err(_) => return Err(AppError::ValidationTimeout(timeout.as_secs())),
        };
        prompts::check_response(&response, &schema)?;
        let verdict: PageVerdict = serde_json::from_value(response)
            .map_err(|e| AppError::malformed_response(e.to_string()))?;

        if !verdict.is_valid {
            return Ok(PageOutcome::Invalid(verdict.reasoning));
        }

        let images = self.usable_images(verdict.image_urls).await;
        if images.is_empty() {
            return Ok(PageOutcome::Invalid(format!(
                "product confirmed but no usable images ({})",
                verdict.reasoning
            )));
        }

        Ok(PageOutcome::Valid(ValidatedPage {
            url: url.to_string(),
            validation_method: ValidationMethod::from_label(&verdict.validation_method)
                .unwrap_or_else(|| ValidationMethod::for_mode(search.mode)),
            image_urls: images,
            reasoning: verdict.reasoning,
            product_description: non_empty(verdict.product_description),
            brand: non_empty(verdict.brand),
            weight: verdict.weight.and_then(|w| {
                let unit = non_empty(w.unit_of_measure)?;
                Some(Weight {
                    value: w.value?,
                    unit_of_measure: unit,
                })
            }),
            dimensions: verdict.dimensions.and_then(|d| {
                Some(Dimensions {
                    length: d.length?,
                    width: d.width?,
                    height: d.height?,
                })
            }),
        }))
    }

    /// Static quality filter, then a live probe per surviving image.
    async fn usable_images(&self, urls: Vec<String>) -> Vec<String> {
        let mut usable = Vec::new();
        for url in filter_image_urls(urls, self.config.max_images_per_page) {
            match self.probe.probe(&url).await {
                Ok(true) => usable.push(url),
                Ok(false) => tracing::debug!(%url, "Image probe rejected URL"),
                Err(e) => tracing::debug!(%url, error = %e, "Image probe failed"),
            }
        }
        usable
    }
}

impl<F, C, J, P> PageValidator for LlmPageValidator<F, C, J, P>
where
    F: Fetcher,
    C: Cleaner,
    J: Judge,
    P: ImageProbe,
{
    async fn validate(
        &self,
        urls: &[String],
        product: &ProductInput,
        config: &SearchConfig,
    ) -> Result<ValidationBatch, AppError> {
        let mut batch = ValidationBatch::default();

        for url in urls.iter().take(self.config.max_candidates) {
            batch.checked.push(url.clone());
            tracing::debug!(%url, config = %config, "Validating page");

            match self.check_page(url, product, config).await {
                Ok(PageOutcome::Valid(page)) => {
                    tracing::info!(
                        %url,
                        method = page.validation_method.as_str(),
                        images = page.image_urls.len(),
                        "Page validated"
                    );
                    batch.validated.push(page);
                    if self.config.stop_after_first_valid {
                        break;
                    }
                }
                Ok(PageOutcome::Invalid(reasoning)) => {
                    batch.invalid.push(InvalidUrl::new(url.clone(), reasoning));
                }
                Err(e) => {
                    tracing::warn!(%url, error = %e, "Page validation failed");
                    batch
                        .invalid
                        .push(InvalidUrl::new(url.clone(), format!("validation failed: {e}")));
                }
            }
        }

        Ok(batch)
    }
}

/// Deduplicate, keep http(s) only, drop obvious non-product assets, cap.
pub fn filter_image_urls(urls: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| looks_like_product_image(u))
        .filter(|u| seen.insert(u.clone()))
        .take(max)
        .collect()
}

fn looks_like_product_image(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let path = url.path().to_lowercase();
    if NON_PRODUCT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    let file = path.rsplit('/').next().unwrap_or_default();
    let dirs = &path[..path.len() - file.len()];
    // Whole words only: "silicone" is not an icon.
    !(dirs.split('/').any(is_marker) || file.split(['-', '_', '.']).any(is_marker))
}

fn is_marker(word: &str) -> bool {
    NON_PRODUCT_MARKERS
        .iter()
        .any(|m| word == *m || word.strip_suffix('s') == Some(*m))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn truncate_chars(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}
