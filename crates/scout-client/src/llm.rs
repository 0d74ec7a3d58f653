use std::time::Duration;

use reqwest::Client;
use scout_core::error::AppError;
use scout_core::traits::{Judge, JudgeRequest, JudgeTask};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI-compatible judge using chat completions with a strict JSON schema.
///
/// Candidate filtering and page validation can use different models; the
/// task carried by each [`JudgeRequest`] picks which.
#[derive(Clone)]
pub struct OpenAiJudge {
    client: Client,
    base_url: String,
    api_key: String,
    filter_model: String,
    validation_model: String,
    timeout_secs: u64,
}

impl OpenAiJudge {
    pub fn new(api_key: &str, filter_model: &str, validation_model: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, filter_model, validation_model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: &str,
        filter_model: &str,
        validation_model: &str,
        base_url: &str,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(DEFAULT_LLM_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            filter_model: filter_model.to_string(),
            validation_model: validation_model.to_string(),
            timeout_secs: DEFAULT_LLM_TIMEOUT.as_secs(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, AppError> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        self.timeout_secs = timeout.as_secs();
        Ok(self)
    }

    fn model_for(&self, task: JudgeTask) -> &str {
        match task {
            JudgeTask::Filter => &self.filter_model,
            JudgeTask::Validation => &self.validation_model,
        }
    }
}

// ---- OpenAI API types ----

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaWrapper<'a>,
}

#[derive(Serialize)]
struct JsonSchemaWrapper<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ApiError {
    pub(crate) error: ApiErrorDetail,
}

#[derive(Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub(crate) message: String,
}

/// Map a transport failure the way every OpenAI-facing adapter does.
pub(crate) fn transport_error(e: reqwest::Error, timeout_secs: u64) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else {
        AppError::HttpError(e.to_string())
    }
}

/// Turn a non-success OpenAI response into a model error.
pub(crate) async fn status_error(response: reqwest::Response) -> AppError {
    let status_code = response.status().as_u16();
    if status_code == 429 {
        return AppError::RateLimitExceeded;
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("HTTP {status_code}: {body}"));

    AppError::Model {
        message,
        status_code,
        retryable: status_code >= 500,
    }
}

impl Judge for OpenAiJudge {
    async fn judge(&self, request: JudgeRequest<'_>) -> Result<serde_json::Value, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = self.model_for(request.task);

        let body = ChatRequest {
            model,
            messages: vec![
                Message {
                    role: "system",
                    content: request.instructions,
                },
                Message {
                    role: "user",
                    content: request.context,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaWrapper {
                    name: request.schema_name,
                    strict: true,
                    schema: request.schema,
                },
            },
        };

        tracing::debug!(model, task = ?request.task, "Calling judge");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::malformed_response(format!("unreadable completion: {e}")))?;

        let content = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| AppError::malformed_response("Empty response from model"))?;

        serde_json::from_str(content).map_err(|e| {
            AppError::malformed_response(format!("model returned invalid JSON: {e}. Raw: {content}"))
        })
    }
}
