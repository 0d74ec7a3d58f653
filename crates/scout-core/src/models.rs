use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Unvalidated product identifiers, as they arrive from CSV rows or request bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFields {
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl ProductFields {
    pub fn new(
        barcode: impl Into<String>,
        sku: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            barcode: Some(barcode.into()),
            sku: Some(sku.into()),
            title: Some(title.into()),
        }
    }

    /// Short human label for log lines (sku, then barcode, then a title prefix).
    pub fn label(&self) -> String {
        fn pick(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        pick(&self.sku)
            .or_else(|| pick(&self.barcode))
            .map(str::to_string)
            .or_else(|| pick(&self.title).map(|t| t.chars().take(30).collect()))
            .unwrap_or_else(|| "<empty>".to_string())
    }
}

/// A product to research. At least one identifier is non-empty.
///
/// Values are trimmed; whitespace-only values count as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProductFields", into = "ProductFields")]
pub struct ProductInput {
    barcode: Option<String>,
    sku: Option<String>,
    title: Option<String>,
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ProductInput {
    /// Build a product from raw strings; empty strings mean "absent".
    pub fn new(
        barcode: impl Into<String>,
        sku: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, AppError> {
        Self::try_from(ProductFields::new(barcode, sku, title))
    }

    pub fn barcode(&self) -> Option<&str> {
        self.barcode.as_deref()
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn fields(&self) -> ProductFields {
        ProductFields::from(self.clone())
    }
}

impl TryFrom<ProductFields> for ProductInput {
    type Error = AppError;

    fn try_from(fields: ProductFields) -> Result<Self, Self::Error> {
        let input = Self {
            barcode: normalize(fields.barcode),
            sku: normalize(fields.sku),
            title: normalize(fields.title),
        };
        if input.barcode.is_none() && input.sku.is_none() && input.title.is_none() {
            return Err(AppError::InvalidInput(
                "at least one of barcode, sku or title must be non-empty".into(),
            ));
        }
        Ok(input)
    }
}

impl From<ProductInput> for ProductFields {
    fn from(input: ProductInput) -> Self {
        Self {
            barcode: input.barcode,
            sku: input.sku,
            title: input.title,
        }
    }
}

/// Search backend a config is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google results via SerpAPI.
    Google,
    /// Yahoo results via SerpAPI.
    Yahoo,
    /// OpenAI model with server-side web search.
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Yahoo => "yahoo",
            Provider::OpenAi => "openai",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "yahoo" => Ok(Provider::Yahoo),
            "openai" => Ok(Provider::OpenAi),
            _ => Err(format!("Unknown provider: {s}")),
        }
    }
}

/// Which product identifiers a config searches with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierMode {
    Barcode,
    Sku,
    TitleSku,
    AllFields,
}

impl IdentifierMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierMode::Barcode => "barcode",
            IdentifierMode::Sku => "sku",
            IdentifierMode::TitleSku => "title_sku",
            IdentifierMode::AllFields => "all_fields",
        }
    }
}

impl fmt::Display for IdentifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One (identifier mode, provider) pairing the orchestrator attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchConfig {
    pub mode: IdentifierMode,
    pub provider: Provider,
    pub bypass_validation: bool,
}

impl SearchConfig {
    pub const fn new(mode: IdentifierMode, provider: Provider) -> Self {
        Self {
            mode,
            provider,
            bypass_validation: false,
        }
    }

    pub const fn bypassing(mode: IdentifierMode, provider: Provider) -> Self {
        Self {
            mode,
            provider,
            bypass_validation: true,
        }
    }

    /// Stable name, e.g. `barcode_google`.
    pub fn name(&self) -> String {
        format!("{}_{}", self.mode, self.provider)
    }

    /// Render the provider query for this config's identifier mode.
    pub fn query(&self, product: &ProductInput) -> String {
        match self.mode {
            IdentifierMode::Barcode => product.barcode().unwrap_or_default().to_string(),
            IdentifierMode::Sku => product.sku().unwrap_or_default().to_string(),
            IdentifierMode::TitleSku => match product.sku() {
                Some(sku) => format!("Title: {}, SKU: {sku}", product.title().unwrap_or_default()),
                None => format!("Title: {}", product.title().unwrap_or_default()),
            },
            IdentifierMode::AllFields => format!(
                "Barcode/UPC: {}, Product SKU/part number: {}, Title: {}",
                product.barcode().unwrap_or_default(),
                product.sku().unwrap_or_default(),
                product.title().unwrap_or_default(),
            ),
        }
    }
}

impl fmt::Display for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single provider hit.
///
/// Plain search engines fill `url`, `title` and `snippet`. Providers that
/// browse and extract on their own (bypass configs) also fill `image_urls`
/// and a `confidence` in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl RawResult {
    pub fn new(url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            snippet: snippet.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_images(mut self, image_urls: Vec<String>) -> Self {
        self.image_urls = image_urls;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Which identifier confirmed a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    Barcode,
    Sku,
    Title,
    AllFieldsSearch,
}

impl ValidationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMethod::Barcode => "barcode",
            ValidationMethod::Sku => "sku",
            ValidationMethod::Title => "title",
            ValidationMethod::AllFieldsSearch => "all_fields_search",
        }
    }

    /// Lenient parse of a model-provided label.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        match label.as_str() {
            "barcode" | "upc" | "ean" | "gtin" => Some(ValidationMethod::Barcode),
            "sku" | "mpn" | "part_number" => Some(ValidationMethod::Sku),
            "title" => Some(ValidationMethod::Title),
            "all_fields_search" => Some(ValidationMethod::AllFieldsSearch),
            _ => None,
        }
    }

    /// Default tag when the model does not say which identifier matched.
    pub fn for_mode(mode: IdentifierMode) -> Self {
        match mode {
            IdentifierMode::Barcode => ValidationMethod::Barcode,
            IdentifierMode::Sku => ValidationMethod::Sku,
            IdentifierMode::TitleSku => ValidationMethod::Title,
            IdentifierMode::AllFields => ValidationMethod::AllFieldsSearch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    pub value: f64,
    pub unit_of_measure: String,
}

/// Product dimensions in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

/// A page confirmed to show the exact product variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedPage {
    pub url: String,
    pub validation_method: ValidationMethod,
    pub image_urls: Vec<String>,
    pub reasoning: String,
    pub product_description: Option<String>,
    pub brand: Option<String>,
    pub weight: Option<Weight>,
    pub dimensions: Option<Dimensions>,
}

/// A rejected candidate and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidUrl {
    pub url: String,
    pub reasoning: String,
}

impl InvalidUrl {
    pub fn new(url: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reasoning: reasoning.into(),
        }
    }
}

/// Page content reduced for model consumption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanedPage {
    pub markdown: String,
    /// Absolute image URLs found in the page markup, in document order.
    pub image_candidates: Vec<String>,
}

/// Output of validating one config's candidate list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationBatch {
    pub validated: Vec<ValidatedPage>,
    pub invalid: Vec<InvalidUrl>,
    /// URLs the validator actually looked at, in processing order.
    pub checked: Vec<String>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// A config produced at least one validated page.
    Validated,
    /// Every config was tried without success.
    Exhausted,
    /// The step ceiling was reached; the result is partial.
    StepLimitExceeded { step_ceiling: u32 },
    /// The run deadline passed; the result is partial.
    DeadlineExceeded { step_ceiling: u32 },
}

impl RunOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            RunOutcome::StepLimitExceeded { .. } | RunOutcome::DeadlineExceeded { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Validated => "validated",
            RunOutcome::Exhausted => "exhausted",
            RunOutcome::StepLimitExceeded { .. } => "step_limit_exceeded",
            RunOutcome::DeadlineExceeded { .. } => "deadline_exceeded",
        }
    }
}

/// Immutable outcome of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub run_id: Uuid,
    pub product: ProductInput,
    pub search_type: Option<String>,
    pub total_checked: usize,
    pub total_validated_images: usize,
    pub validated_pages: Vec<ValidatedPage>,
    pub invalid_urls: Vec<InvalidUrl>,
    pub outcome: RunOutcome,
    pub step_count: u32,
}

impl FinalResult {
    /// The error describing an aborted run, if it was aborted.
    pub fn abort_error(&self) -> Option<AppError> {
        match self.outcome {
            RunOutcome::StepLimitExceeded { step_ceiling }
            | RunOutcome::DeadlineExceeded { step_ceiling } => {
                Some(AppError::RecursionLimitExceeded {
                    steps: self.step_count,
                    ceiling: step_ceiling,
                })
            }
            RunOutcome::Validated | RunOutcome::Exhausted => None,
        }
    }
}
