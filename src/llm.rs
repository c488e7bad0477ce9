//! Client for the remote generation service.
//!
//! One request per call, no retries. The credential is checked before any
//! connection is opened.

use crate::prompt;
use crate::{Error, GeneratedDocument, GenerationConfig, GenerationRequestContext, Result};
use async_trait::async_trait;
use log::{debug, error, info, log_enabled, Level};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Turns a composed prompt into a generated document.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedDocument>;
}

#[async_trait]
impl<T: Generator + ?Sized> Generator for std::sync::Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<GeneratedDocument> {
        (**self).generate(prompt).await
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// HTTP client for a `generateContent` style endpoint
#[derive(Debug, Clone)]
pub struct GenerationClient {
    client: Client,
    config: GenerationConfig,
}

impl GenerationClient {
    /// Build a client. A missing credential is not an error here; it is
    /// reported by [`Generator::generate`] so scrape-only callers still work.
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Full URL of the generation call (without credentials).
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Compose the prompt for `ctx` and generate from it.
    pub async fn generate_from_context(
        &self,
        ctx: &GenerationRequestContext<'_>,
    ) -> Result<GeneratedDocument> {
        let prompt = prompt::compose(ctx);
        self.generate(&prompt).await
    }

    fn api_key(&self) -> Result<HeaderValue> {
        let key = self.config.api_key.as_deref().ok_or_else(|| {
            Error::ConfigError(format!("{} environment variable is not set", crate::API_KEY_ENV))
        })?;
        let mut value = HeaderValue::from_str(key)
            .map_err(|_| Error::ConfigError("API key contains invalid characters".into()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

#[async_trait]
impl Generator for GenerationClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedDocument> {
        let api_key = self.api_key()?;
        let url = self.endpoint_url();

        if log_enabled!(Level::Debug) {
            debug!(
                "prompt template v{} ({}), {} chars",
                prompt::TEMPLATE_VERSION,
                prompt::template_digest(),
                prompt.len()
            );
        }
        info!("Sending generation request to {}", url);

        let body = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(e, self.config.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| request_error(e, self.config.timeout))?;

        if !status.is_success() {
            error!("Generation request failed with status {}", status);
            error!("Response text: {}", text);
            return Err(Error::RequestFailed {
                status: Some(status.as_u16()),
                message: text,
            });
        }

        let document = unwrap_response(&text)?;
        info!("Generated {} bytes of HTML", document.as_str().len());
        Ok(document)
    }
}

fn request_error(err: reqwest::Error, timeout: std::time::Duration) -> Error {
    let message = if err.is_timeout() {
        format!("timed out after {}s", timeout.as_secs())
    } else {
        err.to_string()
    };
    error!("Request to generation service failed: {}", message);
    Error::RequestFailed {
        status: err.status().map(|s| s.as_u16()),
        message,
    }
}

/// Pull the first candidate's first text part out of a response body.
pub fn unwrap_response(body: &str) -> Result<GeneratedDocument> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| Error::InvalidResponse(format!("body is not a valid response: {}", e)))?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let detail = parsed
            .prompt_feedback
            .map(|f| format!(" (prompt feedback: {})", f))
            .unwrap_or_default();
        error!("No candidates in generation response{}", detail);
        return Err(Error::InvalidResponse(format!("no candidates found{}", detail)));
    };

    let part = candidate
        .content
        .and_then(|c| c.parts.into_iter().next())
        .ok_or_else(|| Error::InvalidResponse("no content parts found".into()))?;

    let text = part
        .text
        .ok_or_else(|| Error::InvalidResponse("first content part has no text".into()))?;

    GeneratedDocument::new(text)
}
