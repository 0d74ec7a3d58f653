//! Instructions, context rendering and response schemas for model judgments.

use std::fmt::Write as _;

use serde_json::{Value, json};

use crate::error::AppError;
use crate::models::{CleanedPage, ProductInput, RawResult};

pub const FILTER_SCHEMA_NAME: &str = "candidate_urls";
pub const PAGE_SCHEMA_NAME: &str = "page_verdict";

pub const FILTER_INSTRUCTIONS: &str = "\
You review web search results for one target product and keep only the results \
that are very likely about that exact product.

Check every result against the product identifiers. Use the result title, snippet \
and URL as evidence. Keep a URL only when it plausibly shows the same product, not \
a similar model, a different variant, a category listing or a general article.

Copy kept URLs exactly as given. Never invent or edit URLs. Keep the order in which \
the results were given. When nothing is relevant, return an empty list.

Respond with JSON: {\"urls\": [...], \"total_urls\": <count>}.";

pub const PAGE_INSTRUCTIONS: &str = "\
You validate a single product page and extract product images from it.

The page is VALID only if its content shows the product barcode/UPC, or else the \
exact SKU/part number (not a similar or related one). A matching title alone is not \
enough. Pages for a different variant, finish, color or size are INVALID.

For a valid page:
- validation_method is \"barcode\" or \"sku\", naming the identifier you found.
- image_urls lists direct image URLs of this exact variant only, taken from the \
page content or the image candidates. Prefer large, clean product shots. Skip \
thumbnails, icons, logos, banners and images of other variants.
- product_description is the main description copied as-is from the page, or null.
- brand is the manufacturer name from the page, or null.
- weight has a numeric value and a unit such as lb, oz, kg or g, or null.
- dimensions are length, width and height in inches (convert other units), with \
null for any value not on the page.

For an invalid page set is_valid to false, validation_method to \"none\" and \
image_urls to [].

Always give a one or two sentence reasoning naming what was or was not found. \
Never make up values that are not on the page.";

/// Schema for the candidate filter's answer.
pub fn filter_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "urls": { "type": "array", "items": { "type": "string" } },
            "total_urls": { "type": "integer" }
        },
        "required": ["urls", "total_urls"],
        "additionalProperties": false
    })
}

/// Schema for a single page verdict.
pub fn page_schema() -> Value {
    let nullable_number = json!({ "type": ["number", "null"] });
    json!({
        "type": "object",
        "properties": {
            "is_valid": { "type": "boolean" },
            "validation_method": {
                "type": "string",
                "enum": ["barcode", "sku", "title", "none"]
            },
            "reasoning": { "type": "string" },
            "image_urls": { "type": "array", "items": { "type": "string" } },
            "product_description": { "type": ["string", "null"] },
            "brand": { "type": ["string", "null"] },
            "weight": {
                "type": ["object", "null"],
                "properties": {
                    "value": nullable_number,
                    "unit_of_measure": { "type": ["string", "null"] }
                },
                "required": ["value", "unit_of_measure"],
                "additionalProperties": false
            },
            "dimensions": {
                "type": ["object", "null"],
                "properties": {
                    "length": nullable_number,
                    "width": nullable_number,
                    "height": nullable_number
                },
                "required": ["length", "width", "height"],
                "additionalProperties": false
            }
        },
        "required": [
            "is_valid", "validation_method", "reasoning", "image_urls",
            "product_description", "brand", "weight", "dimensions"
        ],
        "additionalProperties": false
    })
}

/// Reject a model response that does not match `schema`.
///
/// A bad schema is a [`AppError::SchemaValidationError`]; a bad response is a
/// non-retryable model error.
pub fn check_response(response: &Value, schema: &Value) -> Result<(), AppError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| AppError::SchemaValidationError(e.to_string()))?;

    let errors: Vec<String> = validator
        .iter_errors(response)
        .take(5)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::malformed_response(format!(
            "response does not match schema: {}",
            errors.join("; ")
        )))
    }
}

fn product_block(product: &ProductInput) -> String {
    format!(
        "Barcode: {}\nSKU: {}\nTitle: {}\n",
        product.barcode().unwrap_or("(none)"),
        product.sku().unwrap_or("(none)"),
        product.title().unwrap_or("(none)"),
    )
}

pub fn filter_context(product: &ProductInput, raw: &[RawResult]) -> String {
    let mut out = String::from("The product in question:\n");
    out.push_str(&product_block(product));
    out.push_str("\nThe search results to review:\n");
    for (i, r) in raw.iter().enumerate() {
        let _ = writeln!(out, "{}. URL: {}", i + 1, r.url);
        if !r.title.is_empty() {
            let _ = writeln!(out, "   Title: {}", r.title);
        }
        if !r.snippet.is_empty() {
            let _ = writeln!(out, "   Snippet: {}", r.snippet);
        }
    }
    out
}

pub fn page_context(product: &ProductInput, url: &str, page: &CleanedPage) -> String {
    let mut out = String::from("Product information:\n");
    out.push_str(&product_block(product));
    let _ = writeln!(out, "\nPage URL: {url}");
    if !page.image_candidates.is_empty() {
        out.push_str("\nImage candidates:\n");
        for img in &page.image_candidates {
            let _ = writeln!(out, "- {img}");
        }
    }
    out.push_str("\nPage content:\n");
    out.push_str(&page.markdown);
    out
}
