use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Scout API",
        version = "0.1.0",
        description = "Find and validate product images by barcode, SKU or title."
    ),
    paths(
        crate::routes::research,
        crate::routes::batch,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::ResearchRequest,
        crate::dto::ResearchResponse,
        crate::dto::ProductResponse,
        crate::dto::ValidatedPageResponse,
        crate::dto::WeightResponse,
        crate::dto::DimensionsResponse,
        crate::dto::InvalidUrlResponse,
        crate::dto::OutcomeResponse,
        crate::dto::BatchRequest,
        crate::dto::BatchResponse,
        crate::dto::BatchItemResponse,
        crate::dto::BatchErrorResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "research", description = "Product image research"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds Bearer token security scheme to the OpenAPI document.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some(
                            "API key. Set via SCOUT_SERVER_API_KEY environment variable.",
                        ))
                        .build(),
                ),
            );
        }
    }
}
