use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scout_core::models::{InvalidUrl, RunOutcome, ValidatedPage};
use scout_core::{BatchOutcome, BatchReport, ErrorRecord, FinalResult, ProductFields};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Product identifiers. At least one must be non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ResearchRequest {
    #[schema(example = "012345678905")]
    pub barcode: Option<String>,
    #[schema(example = "WID-12345")]
    pub sku: Option<String>,
    #[schema(example = "Acme Blue Widget 12oz")]
    pub title: Option<String>,
}

impl From<ResearchRequest> for ProductFields {
    fn from(req: ResearchRequest) -> Self {
        ProductFields {
            barcode: req.barcode,
            sku: req.sku,
            title: req.title,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BatchRequest {
    pub products: Vec<ResearchRequest>,
    /// Products researched at the same time (default 3, capped server-side).
    pub concurrency: Option<usize>,
}

// ---------------------------------------------------------------------------
// Research result
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProductResponse {
    pub barcode: Option<String>,
    pub sku: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WeightResponse {
    pub value: f64,
    pub unit_of_measure: String,
}

/// Dimensions in inches.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DimensionsResponse {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ValidatedPageResponse {
    pub url: String,
    /// `barcode`, `sku`, `title` or `all_fields_search`.
    pub validation_method: String,
    pub image_urls: Vec<String>,
    pub reasoning: String,
    pub product_description: Option<String>,
    pub brand: Option<String>,
    pub weight: Option<WeightResponse>,
    pub dimensions: Option<DimensionsResponse>,
}

impl From<ValidatedPage> for ValidatedPageResponse {
    fn from(page: ValidatedPage) -> Self {
        Self {
            url: page.url,
            validation_method: page.validation_method.as_str().to_string(),
            image_urls: page.image_urls,
            reasoning: page.reasoning,
            product_description: page.product_description,
            brand: page.brand,
            weight: page.weight.map(|w| WeightResponse {
                value: w.value,
                unit_of_measure: w.unit_of_measure,
            }),
            dimensions: page.dimensions.map(|d| DimensionsResponse {
                length: d.length,
                width: d.width,
                height: d.height,
            }),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct InvalidUrlResponse {
    pub url: String,
    pub reasoning: String,
}

impl From<InvalidUrl> for InvalidUrlResponse {
    fn from(invalid: InvalidUrl) -> Self {
        Self {
            url: invalid.url,
            reasoning: invalid.reasoning,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OutcomeResponse {
    /// `validated`, `exhausted`, `step_limit_exceeded` or `deadline_exceeded`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_ceiling: Option<u32>,
}

impl From<RunOutcome> for OutcomeResponse {
    fn from(outcome: RunOutcome) -> Self {
        let step_ceiling = match outcome {
            RunOutcome::StepLimitExceeded { step_ceiling }
            | RunOutcome::DeadlineExceeded { step_ceiling } => Some(step_ceiling),
            RunOutcome::Validated | RunOutcome::Exhausted => None,
        };
        Self {
            status: outcome.as_str().to_string(),
            step_ceiling,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ResearchResponse {
    pub run_id: Uuid,
    pub product: ProductResponse,
    /// Identifier mode of the config that produced the validated pages.
    pub search_type: Option<String>,
    pub total_checked: usize,
    pub total_validated_images: usize,
    pub validated_pages: Vec<ValidatedPageResponse>,
    pub invalid_urls: Vec<InvalidUrlResponse>,
    pub outcome: OutcomeResponse,
    pub step_count: u32,
}

impl From<FinalResult> for ResearchResponse {
    fn from(result: FinalResult) -> Self {
        let product = result.product.fields();
        Self {
            run_id: result.run_id,
            product: ProductResponse {
                barcode: product.barcode,
                sku: product.sku,
                title: product.title,
            },
            search_type: result.search_type,
            total_checked: result.total_checked,
            total_validated_images: result.total_validated_images,
            validated_pages: result.validated_pages.into_iter().map(Into::into).collect(),
            invalid_urls: result.invalid_urls.into_iter().map(Into::into).collect(),
            outcome: result.outcome.into(),
            step_count: result.step_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BatchErrorResponse {
    /// Zero-based position in the request's product list.
    pub row: usize,
    pub product: ResearchRequest,
    pub error: String,
    pub partial: Option<ResearchResponse>,
}

impl From<ErrorRecord> for BatchErrorResponse {
    fn from(record: ErrorRecord) -> Self {
        Self {
            row: record.row,
            product: ResearchRequest {
                barcode: record.product.barcode,
                sku: record.product.sku,
                title: record.product.title,
            },
            error: record.error,
            partial: record.partial.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItemResponse {
    Completed(ResearchResponse),
    Failed(BatchErrorResponse),
}

impl From<BatchOutcome> for BatchItemResponse {
    fn from(outcome: BatchOutcome) -> Self {
        match outcome {
            BatchOutcome::Completed(result) => BatchItemResponse::Completed(result.into()),
            BatchOutcome::Failed(record) => BatchItemResponse::Failed(record.into()),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BatchResponse {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// One entry per requested product, in request order.
    pub items: Vec<BatchItemResponse>,
}

impl From<BatchReport> for BatchResponse {
    fn from(report: BatchReport) -> Self {
        Self {
            total: report.total,
            successful: report.successful,
            failed: report.failed,
            items: report.items.into_iter().map(Into::into).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
