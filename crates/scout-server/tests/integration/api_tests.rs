use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use crate::common::{authed_post, send, setup_test_app};

#[tokio::test]
async fn health_returns_200() {
    let (status, json) = send(
        setup_test_app(),
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn openapi_document_lists_routes() {
    let (status, json) = send(
        setup_test_app(),
        Request::get("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/v1/research"].is_object());
    assert!(json["paths"]["/v1/batch"].is_object());
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let request = Request::post("/v1/research")
        .header("content-type", "application/json")
        .body(Body::from(json!({"barcode": "012345678905"}).to_string()))
        .unwrap();
    let (status, json) = send(setup_test_app(), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn wrong_api_key_returns_401() {
    let request = Request::post("/v1/research")
        .header("authorization", "Bearer wrong-key")
        .header("content-type", "application/json")
        .body(Body::from(json!({"barcode": "012345678905"}).to_string()))
        .unwrap();
    let (status, _) = send(setup_test_app(), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn research_stops_at_first_successful_config() {
    let (status, json) = send(
        setup_test_app(),
        authed_post(
            "/v1/research",
            json!({"barcode": "012345678905", "sku": "WID-12345", "title": "Blue Widget"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "validated");
    assert_eq!(json["search_type"], "barcode");
    assert_eq!(json["product"]["barcode"], "012345678905");

    let pages = json["validated_pages"].as_array().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(
        pages[0]["url"],
        "https://shop.example/barcode_google/012345678905"
    );
    assert_eq!(pages[0]["validation_method"], "barcode");
    assert_eq!(json["total_validated_images"], 1);
    assert!(json["invalid_urls"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn research_falls_back_to_bypass_config() {
    let (status, json) = send(
        setup_test_app(),
        authed_post("/v1/research", json!({"sku": "WID-12345"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "validated");
    assert_eq!(json["search_type"], "all_fields");

    let pages = json["validated_pages"].as_array().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0]["validation_method"], "all_fields_search");

    // sku_google, sku_yahoo and sku_openai were each rejected once.
    assert_eq!(json["invalid_urls"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn research_with_no_hits_is_exhausted() {
    let (status, json) = send(
        setup_test_app(),
        authed_post("/v1/research", json!({"title": "nothing matches"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "exhausted");
    assert!(json["search_type"].is_null());
    assert!(json["validated_pages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn research_without_identifiers_returns_400() {
    let (status, json) = send(
        setup_test_app(),
        authed_post("/v1/research", json!({"barcode": "  ", "sku": ""})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_input");
}

#[tokio::test]
async fn batch_isolates_invalid_rows() {
    let (status, json) = send(
        setup_test_app(),
        authed_post(
            "/v1/batch",
            json!({
                "products": [
                    {"barcode": "012345678905"},
                    {"barcode": "", "sku": null, "title": " "},
                    {"barcode": "098765432109"}
                ],
                "concurrency": 2
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 3);
    assert_eq!(json["successful"], 2);
    assert_eq!(json["failed"], 1);

    let items = json["items"].as_array().unwrap();
    assert_eq!(items[0]["status"], "completed");
    assert_eq!(items[0]["product"]["barcode"], "012345678905");
    assert_eq!(items[1]["status"], "failed");
    assert_eq!(items[1]["row"], 1);
    assert_eq!(items[2]["status"], "completed");
    assert_eq!(items[2]["product"]["barcode"], "098765432109");
}

#[tokio::test]
async fn empty_batch_returns_400() {
    let (status, json) = send(
        setup_test_app(),
        authed_post("/v1/batch", json!({"products": []})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_input");
}
