use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use tower::ServiceExt;

use scout_core::models::{IdentifierMode, ValidationBatch, ValidatedPage, ValidationMethod};
use scout_core::{
    AppError, CandidateFilter, Orchestrator, PageValidator, ProductInput, RawResult,
    SearchConfig, SearchProvider, WorkflowConfig,
};
use scout_server::routes;
use scout_server::state::{AppState, OrchestratorService};

pub const TEST_API_KEY: &str = "test-secret-key";

/// Returns one hit per query, except for queries containing "nothing".
#[derive(Clone)]
pub struct StubSearch;

impl SearchProvider for StubSearch {
    async fn search(&self, config: &SearchConfig, query: &str) -> Result<Vec<RawResult>, AppError> {
        if query.contains("nothing") {
            return Ok(Vec::new());
        }
        let url = format!("https://shop.example/{}/{}", config.name(), query.replace(' ', "-"));
        Ok(vec![
            RawResult::new(url, "exact match")
                .with_title("Blue Widget")
                .with_images(vec!["https://shop.example/img/1.jpg".into()])
                .with_confidence(0.9),
        ])
    }
}

/// Keeps every raw result.
#[derive(Clone)]
pub struct KeepAll;

impl CandidateFilter for KeepAll {
    async fn filter(
        &self,
        raw: &[RawResult],
        _product: &ProductInput,
    ) -> Result<Vec<String>, AppError> {
        Ok(raw.iter().map(|r| r.url.clone()).collect())
    }
}

/// Confirms every candidate for barcode configs, rejects everything else.
#[derive(Clone)]
pub struct BarcodeOnly;

impl PageValidator for BarcodeOnly {
    async fn validate(
        &self,
        urls: &[String],
        _product: &ProductInput,
        config: &SearchConfig,
    ) -> Result<ValidationBatch, AppError> {
        let mut batch = ValidationBatch {
            checked: urls.to_vec(),
            ..ValidationBatch::default()
        };
        for url in urls {
            if config.mode == IdentifierMode::Barcode {
                batch.validated.push(ValidatedPage {
                    url: url.clone(),
                    validation_method: ValidationMethod::Barcode,
                    image_urls: vec![format!("{url}/main.jpg")],
                    reasoning: "barcode on page".into(),
                    product_description: None,
                    brand: Some("Acme".into()),
                    weight: None,
                    dimensions: None,
                });
            } else {
                batch
                    .invalid
                    .push(scout_core::InvalidUrl::new(url.clone(), "identifier not found"));
            }
        }
        Ok(batch)
    }
}

pub fn setup_test_app() -> Router {
    let config = WorkflowConfig::default().with_retry_delay(std::time::Duration::ZERO);
    let orchestrator = Arc::new(Orchestrator::new(StubSearch, KeepAll, BarcodeOnly, config));
    let state = Arc::new(AppState {
        service: Arc::new(OrchestratorService::new(orchestrator)),
        api_key: TEST_API_KEY.to_string(),
    });
    routes::router(state)
}

pub fn authed_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {TEST_API_KEY}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> (axum::http::StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}
