use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use scout_core::{AppError, ProductFields, ProductInput};

use crate::auth::require_api_key;
use crate::dto::{BatchRequest, BatchResponse, HealthResponse, ResearchRequest, ResearchResponse};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Largest product list accepted by `POST /v1/batch`.
pub const MAX_BATCH_PRODUCTS: usize = 500;
const DEFAULT_BATCH_CONCURRENCY: usize = 3;
const MAX_BATCH_CONCURRENCY: usize = 10;
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/research", post(research))
        .route("/v1/batch", post(batch))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/research",
    request_body = ResearchRequest,
    responses(
        (status = 200, description = "Research result, including partial results of aborted runs", body = ResearchResponse),
        (status = 400, description = "No usable identifier", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "research"
)]
pub async fn research(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<ResearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product = ProductInput::try_from(ProductFields::from(body))?;
    tracing::info!(product = %product.fields().label(), "Research requested");

    let result = state.service.research(product).await?;
    if let Some(err) = result.abort_error() {
        tracing::warn!(run_id = %result.run_id, error = %err, "Run aborted, returning partial result");
    }

    Ok(axum::Json(ResearchResponse::from(result)))
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/batch",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "One outcome per product, in request order", body = BatchResponse),
        (status = 400, description = "Empty or oversized product list", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "research"
)]
pub async fn batch(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<BatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.products.is_empty() {
        return Err(AppError::InvalidInput("products must not be empty".into()).into());
    }
    if body.products.len() > MAX_BATCH_PRODUCTS {
        return Err(AppError::InvalidInput(format!(
            "at most {MAX_BATCH_PRODUCTS} products per batch"
        ))
        .into());
    }

    let concurrency = body
        .concurrency
        .unwrap_or(DEFAULT_BATCH_CONCURRENCY)
        .clamp(1, MAX_BATCH_CONCURRENCY);
    let rows: Vec<ProductFields> = body.products.into_iter().map(Into::into).collect();
    tracing::info!(rows = rows.len(), concurrency, "Batch requested");

    let report = state.service.batch(rows, concurrency).await;
    Ok(axum::Json(BatchResponse::from(report)))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health() -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
