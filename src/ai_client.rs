use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use crate::config::AppConfig;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Models offered in the settings model picker.
pub const AVAILABLE_MODELS: [&str; 4] = [
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
];

const SYSTEM_PROMPT: &str = "You rewrite text that a user selected in another application. \
Follow the user's instructions, keep the language of the original text, \
and reply with the rewritten text only: no preamble, no quotes, no explanations.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Http(String),
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("service returned no text")]
    EmptyResponse,
}

impl RewriteError {
    /// The service rejected the API key. Matched on the error text since
    /// that is all the service exposes, e.g. `API_KEY_INVALID`.
    pub fn is_credential_failure(&self) -> bool {
        let message = self.to_string().to_lowercase();
        message.contains("api_key") || message.contains("api key")
    }
}

/// A single rewrite call.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteRequest {
    pub api_key: String,
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
}

impl RewriteRequest {
    pub fn from_config(config: &AppConfig, text: &str) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            prompt: build_prompt(&config.user_instructions, text),
            temperature: config.temperature(),
            max_output_tokens: None,
        }
    }
}

/// Fixed system prompt, then the user's instructions, then the text.
pub fn build_prompt(user_instructions: &str, text: &str) -> String {
    let instructions = user_instructions.trim_end();
    let instructions = instructions.strip_suffix(':').unwrap_or(instructions);
    format!(
        "\nYour System Prompt:\n{SYSTEM_PROMPT}\n\nUser's instructions:\n{instructions}:\n\nText for the task:\n{text}\n"
    )
}

pub type RewriteFuture<'a> = Pin<Box<dyn Future<Output = Result<String, RewriteError>> + Send + 'a>>;

/// External text generation service.
pub trait RewriteService: Send + Sync {
    fn rewrite<'a>(&'a self, request: &'a RewriteRequest) -> RewriteFuture<'a>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

fn request_body(request: &RewriteRequest) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: &request.prompt,
            }],
        }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
        },
    }
}

/// Text of the first candidate, or `EmptyResponse` when there is none.
fn extract_text(response: GenerateResponse) -> Result<String, RewriteError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(RewriteError::EmptyResponse)
    } else {
        Ok(text)
    }
}

/// Readable message for an error response, keeping the machine reason
/// (such as `API_KEY_INVALID`) next to the human text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let reasons: Vec<String> = envelope
                .error
                .details
                .into_iter()
                .filter_map(|detail| detail.reason)
                .collect();
            let mut message = envelope.error.message;
            if !envelope.error.status.is_empty() {
                message = format!("{} ({})", message, envelope.error.status);
            }
            if !reasons.is_empty() {
                message = format!("{} [{}]", message, reasons.join(", "));
            }
            message
        }
        Err(_) => body.trim().to_string(),
    }
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    client: Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new() -> Result<Self, RewriteError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, RewriteError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RewriteError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    pub async fn generate(&self, request: &RewriteRequest) -> Result<String, RewriteError> {
        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &request.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| RewriteError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RewriteError::Api {
                status,
                message: error_message(&body),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RewriteError::Http(e.to_string()))?;
        extract_text(parsed)
    }
}

impl RewriteService for GeminiClient {
    fn rewrite<'a>(&'a self, request: &'a RewriteRequest) -> RewriteFuture<'a> {
        Box::pin(self.generate(request))
    }
}

/// Result of the settings "Test API Connection" action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Ok,
    EmptyResponse,
    InvalidKey,
    Failed(String),
}

impl ConnectionStatus {
    pub fn describe(&self) -> String {
        match self {
            Self::Ok => "Connection successful! API settings are valid.".to_string(),
            Self::EmptyResponse => "Connection test returned empty response.".to_string(),
            Self::InvalidKey => "Connection test failed: Invalid API key..".to_string(),
            Self::Failed(e) => format!("Connection test failed: {}", e),
        }
    }
}

/// Sends a tiny prompt with the given settings.
pub async fn test_connection(service: &dyn RewriteService, config: &AppConfig) -> ConnectionStatus {
    let request = RewriteRequest {
        api_key: config.api_key.clone(),
        model: config.model.clone(),
        prompt: "Hello".to_string(),
        temperature: 0.2,
        max_output_tokens: Some(10),
    };

    match service.rewrite(&request).await {
        Ok(_) => ConnectionStatus::Ok,
        Err(RewriteError::EmptyResponse) => ConnectionStatus::EmptyResponse,
        Err(e) if e.is_credential_failure() => ConnectionStatus::InvalidKey,
        Err(e) => ConnectionStatus::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_strips_trailing_colon_from_instructions() {
        let prompt = build_prompt("Fix the grammar:", "helo wrld");
        assert!(prompt.contains("User's instructions:\nFix the grammar:\n\nText for the task:"));
        assert!(prompt.contains(&format!("{SYSTEM_PROMPT}\n\nUser's instructions:")));
        assert!(!prompt.contains("grammar::"));
        assert!(prompt.ends_with("Text for the task:\nhelo wrld\n"));
        assert!(prompt.contains(SYSTEM_PROMPT));
    }

    #[test]
    fn request_temperature_follows_creativity() {
        let mut config = AppConfig {
            creativity_level: 0,
            ..AppConfig::default()
        };
        assert_eq!(RewriteRequest::from_config(&config, "helo wrld").temperature, 0.0);

        config.creativity_level = 10;
        assert_eq!(RewriteRequest::from_config(&config, "helo wrld").temperature, 1.0);
    }

    #[test]
    fn request_body_matches_generate_content_shape() {
        let request = RewriteRequest {
            api_key: "k".to_string(),
            model: "gemini-2.0-flash-lite".to_string(),
            prompt: "hi".to_string(),
            temperature: 0.5,
            max_output_tokens: None,
        };
        let body = serde_json::to_value(request_body(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{"parts": [{"text": "hi"}]}],
                "generationConfig": {"temperature": 0.5}
            })
        );
    }

    #[test]
    fn max_output_tokens_is_sent_when_set() {
        let request = RewriteRequest {
            api_key: "k".to_string(),
            model: "m".to_string(),
            prompt: "Hello".to_string(),
            temperature: 0.5,
            max_output_tokens: Some(10),
        };
        let body = serde_json::to_value(request_body(&request)).unwrap();
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 10);
    }

    #[test]
    fn endpoint_includes_model() {
        let client = GeminiClient::with_base_url("http://localhost:9/v1beta/").unwrap();
        assert_eq!(
            client.endpoint("gemini-2.0-flash"),
            "http://localhost:9/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn text_parts_of_first_candidate_are_joined() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "Hello "}, {"text": "world"}], "role": "model"}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Hello world");
    }

    #[test]
    fn missing_candidates_is_empty_response() {
        let response: GenerateResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert!(matches!(
            extract_text(response),
            Err(RewriteError::EmptyResponse)
        ));
    }

    #[test]
    fn invalid_key_error_is_a_credential_failure() {
        let body = json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [{"@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID"}]
            }
        })
        .to_string();
        let err = RewriteError::Api {
            status: 400,
            message: error_message(&body),
        };
        assert!(err.to_string().contains("API_KEY_INVALID"));
        assert!(err.is_credential_failure());
    }

    #[test]
    fn other_failures_are_not_credential_failures() {
        let err = RewriteError::Api {
            status: 503,
            message: error_message("upstream overloaded"),
        };
        assert!(!err.is_credential_failure());
        assert!(!RewriteError::EmptyResponse.is_credential_failure());
        assert!(!RewriteError::Http("connection reset".to_string()).is_credential_failure());
    }

    #[test]
    fn invalid_argument_about_a_json_key_is_not_a_credential_failure() {
        let body = json!({
            "error": {
                "code": 400,
                "message": "Invalid JSON payload received. Unknown name \"tempreature\": Cannot find field key.",
                "status": "INVALID_ARGUMENT"
            }
        })
        .to_string();
        let err = RewriteError::Api {
            status: 400,
            message: error_message(&body),
        };
        assert!(!err.is_credential_failure());
    }

    struct Canned(fn() -> Result<String, RewriteError>);

    impl RewriteService for Canned {
        fn rewrite<'a>(&'a self, _request: &'a RewriteRequest) -> RewriteFuture<'a> {
            let result = (self.0)();
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn connection_test_classifies_outcomes() {
        let config = AppConfig::default();

        let ok = Canned(|| Ok("Hi".to_string()));
        assert_eq!(test_connection(&ok, &config).await, ConnectionStatus::Ok);

        let empty = Canned(|| Err(RewriteError::EmptyResponse));
        assert_eq!(
            test_connection(&empty, &config).await,
            ConnectionStatus::EmptyResponse
        );

        let bad_key = Canned(|| {
            Err(RewriteError::Api {
                status: 400,
                message: "API key not valid [API_KEY_INVALID]".to_string(),
            })
        });
        assert_eq!(
            test_connection(&bad_key, &config).await,
            ConnectionStatus::InvalidKey
        );

        let down = Canned(|| Err(RewriteError::Http("timed out".to_string())));
        assert!(matches!(
            test_connection(&down, &config).await,
            ConnectionStatus::Failed(_)
        ));
    }
}
