//! Search backends: SerpAPI for Google and Yahoo, OpenAI web search for the
//! model-driven configs.

use std::time::Duration;

use reqwest::Client;
use scout_core::error::AppError;
use scout_core::models::{IdentifierMode, Provider, RawResult, SearchConfig};
use scout_core::traits::SearchProvider;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::llm::{DEFAULT_BASE_URL, status_error, transport_error};

pub const SERPAPI_BASE_URL: &str = "https://serpapi.com";
const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Phrases SerpAPI uses when a query simply matched nothing.
const NO_RESULTS_PHRASES: &[&str] = &[
    "no results",
    "hasn't returned any results",
    "hasn\u{2019}t returned any results",
    "did not match any documents",
];

fn is_no_results(message: &str) -> bool {
    let lower = message.to_lowercase();
    NO_RESULTS_PHRASES.iter().any(|p| lower.contains(p))
}

fn transient(provider: Provider, message: impl Into<String>) -> AppError {
    AppError::TransientProvider {
        provider,
        message: message.into(),
    }
}

fn fatal(provider: Provider, message: impl Into<String>) -> AppError {
    AppError::FatalProvider {
        provider,
        message: message.into(),
    }
}

// ---- SerpAPI ----

/// Google and Yahoo organic results through SerpAPI's JSON endpoint.
#[derive(Clone)]
pub struct SerpApiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct OrganicResult {
    link: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl SerpApiProvider {
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, SERPAPI_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(DEFAULT_SEARCH_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout_secs: DEFAULT_SEARCH_TIMEOUT.as_secs(),
        })
    }

    fn request_url(&self, provider: Provider, query: &str) -> Result<Url, AppError> {
        // Yahoo takes its query in `p`, Google in `q`.
        let (engine, query_param) = match provider {
            Provider::Google => ("google", "q"),
            Provider::Yahoo => ("yahoo", "p"),
            Provider::OpenAi => {
                return Err(fatal(provider, "SerpAPI does not serve this provider"));
            }
        };
        Url::parse_with_params(
            &format!("{}/search.json", self.base_url),
            &[
                ("engine", engine),
                (query_param, query),
                ("api_key", self.api_key.as_str()),
            ],
        )
        .map_err(|e| fatal(provider, format!("invalid SerpAPI URL: {e}")))
    }
}

impl SearchProvider for SerpApiProvider {
    async fn search(&self, config: &SearchConfig, query: &str) -> Result<Vec<RawResult>, AppError> {
        let provider = config.provider;
        let url = self.request_url(provider, query)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs).into_provider_error(provider))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transient(provider, format!("failed to read SerpAPI body: {e}")))?;
        let parsed = serde_json::from_str::<SerpResponse>(&body);

        if !status.is_success() {
            let message = parsed
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("HTTP {}: {body}", status.as_u16()));
            if is_no_results(&message) {
                return Ok(Vec::new());
            }
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                transient(provider, message)
            } else {
                fatal(provider, message)
            });
        }

        let parsed =
            parsed.map_err(|e| transient(provider, format!("unreadable SerpAPI response: {e}")))?;

        if let Some(message) = parsed.error {
            if is_no_results(&message) {
                tracing::debug!(config = %config, "SerpAPI returned no results");
                return Ok(Vec::new());
            }
            return Err(fatal(provider, message));
        }

        Ok(parsed
            .organic_results
            .into_iter()
            .filter_map(|r| {
                let link = r.link.filter(|l| !l.trim().is_empty())?;
                Some(RawResult::new(link, r.snippet).with_title(r.title))
            })
            .collect())
    }
}

// ---- OpenAI web search ----

const WEB_SEARCH_INSTRUCTIONS: &str = "\
Search the web for the product identified by the user's query. Return the \
pages most likely to show this exact product, such as retailer, distributor or \
manufacturer product pages. Skip search-engine pages, category listings and \
unrelated articles. Copy each page URL exactly as found. Return an empty list \
when nothing relevant turns up.";

const ALL_FIELDS_INSTRUCTIONS: &str = "\
Search the web for product images of the product described by the user's query \
(barcode/UPC, SKU/part number and title). For each page that shows this exact \
product, return the page URL as source_url, the direct URLs of product images on \
that page as image_urls, and a confidence between 0 and 1 that the page shows \
the same product. Only include pages you actually found. Prefer large, clean \
product shots and skip thumbnails, logos and images of other variants. Return an \
empty list when nothing relevant turns up.";

fn results_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "results": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "url": { "type": "string" },
                        "snippet": { "type": "string" }
                    },
                    "required": ["title", "url", "snippet"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["results"],
        "additionalProperties": false
    })
}

fn items_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "source_url": { "type": "string" },
                        "image_urls": { "type": "array", "items": { "type": "string" } },
                        "confidence": { "type": "number" }
                    },
                    "required": ["source_url", "image_urls", "confidence"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["items"],
        "additionalProperties": false
    })
}

#[derive(Deserialize)]
struct ResponsesOutput {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct WebResults {
    results: Vec<WebResult>,
}

#[derive(Deserialize)]
struct WebResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Deserialize)]
struct WebItems {
    items: Vec<WebItem>,
}

#[derive(Deserialize)]
struct WebItem {
    source_url: String,
    #[serde(default)]
    image_urls: Vec<String>,
    confidence: Option<f32>,
}

/// Concatenated `output_text` of every assistant message in a Responses API reply.
fn output_text(output: ResponsesOutput) -> String {
    output
        .output
        .into_iter()
        .filter(|item| item.kind == "message")
        .flat_map(|item| item.content)
        .filter(|c| c.kind == "output_text")
        .map(|c| c.text)
        .collect()
}

/// Web search performed by an OpenAI model with the `web_search_preview` tool.
///
/// For `AllFields` configs the model also extracts image URLs and a
/// confidence per page, so the orchestrator can skip validation.
#[derive(Clone)]
pub struct OpenAiWebSearchProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiWebSearchProvider {
    pub fn new(api_key: &str, model: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(DEFAULT_SEARCH_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs: DEFAULT_SEARCH_TIMEOUT.as_secs(),
        })
    }

    fn request_body(&self, mode: IdentifierMode, query: &str) -> Value {
        let (instructions, name, schema) = match mode {
            IdentifierMode::AllFields => (ALL_FIELDS_INSTRUCTIONS, "product_images", items_schema()),
            _ => (WEB_SEARCH_INSTRUCTIONS, "search_results", results_schema()),
        };
        json!({
            "model": self.model,
            "tools": [{ "type": "web_search_preview" }],
            "instructions": instructions,
            "input": query,
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": name,
                    "strict": true,
                    "schema": schema
                }
            }
        })
    }
}

impl SearchProvider for OpenAiWebSearchProvider {
    async fn search(&self, config: &SearchConfig, query: &str) -> Result<Vec<RawResult>, AppError> {
        let provider = config.provider;
        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(config.mode, query))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs).into_provider_error(provider))?;

        if !response.status().is_success() {
            return Err(status_error(response).await.into_provider_error(provider));
        }

        // Malformed output is usually a one-off generation glitch, so it stays retryable.
        let output: ResponsesOutput = response
            .json()
            .await
            .map_err(|e| transient(provider, format!("unreadable web search response: {e}")))?;
        let text = output_text(output);

        if config.mode == IdentifierMode::AllFields {
            let parsed: WebItems = serde_json::from_str(&text)
                .map_err(|e| transient(provider, format!("malformed web search output: {e}")))?;
            return Ok(parsed
                .items
                .into_iter()
                .filter(|i| !i.source_url.trim().is_empty())
                .map(|i| {
                    let result = RawResult::new(i.source_url, "").with_images(i.image_urls);
                    match i.confidence {
                        Some(c) => result.with_confidence(c.clamp(0.0, 1.0)),
                        None => result,
                    }
                })
                .collect());
        }

        let parsed: WebResults = serde_json::from_str(&text)
            .map_err(|e| transient(provider, format!("malformed web search output: {e}")))?;
        Ok(parsed
            .results
            .into_iter()
            .filter(|r| !r.url.trim().is_empty())
            .map(|r| RawResult::new(r.url, r.snippet).with_title(r.title))
            .collect())
    }
}

// ---- Routing ----

/// Sends each config to the backend serving its provider.
#[derive(Clone)]
pub struct ProviderRouter {
    serp: SerpApiProvider,
    openai: OpenAiWebSearchProvider,
}

impl ProviderRouter {
    pub fn new(serp: SerpApiProvider, openai: OpenAiWebSearchProvider) -> Self {
        Self { serp, openai }
    }
}

impl SearchProvider for ProviderRouter {
    async fn search(&self, config: &SearchConfig, query: &str) -> Result<Vec<RawResult>, AppError> {
        match config.provider {
            Provider::Google | Provider::Yahoo => self.serp.search(config, query).await,
            Provider::OpenAi => self.openai.search(config, query).await,
        }
    }
}
