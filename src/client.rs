use std::env;
use std::pin::Pin;
use std::time::{Duration, Instant};

use futures::stream::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUESTS, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS};
use crate::sse::process_sse;
use crate::types::{ApiErrorBody, GenerateContentRequest, GenerateContentResponse, Turn};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "API_KEY";

/// A lazily consumed sequence of reply text deltas.
///
/// The stream is finite and cannot be restarted.  A transport failure is yielded as a single
/// `Err` after zero or more deltas, and nothing follows it.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A stream of parsed response chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>;

/// Everything a backend needs to stream one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Model name sent to the API.
    pub model: String,
    /// Fixed system instruction.
    pub system_instruction: Option<String>,
    /// Reasoning budget, for variants that carry one.
    pub thinking_budget: Option<u32>,
    /// Prior turns followed by the new user turn.
    pub contents: Vec<Turn>,
}

/// A hosted chat API that streams replies.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start streaming a reply to `request`.
    ///
    /// Rejections (bad credential, quota, unreachable host) fail here; failures after the reply
    /// has started arrive through the returned stream.
    async fn stream_reply(&self, request: ChatRequest) -> Result<DeltaStream>;
}

/// Client for the Gemini `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    /// Create a new client.
    ///
    /// The API key can be provided directly or read from the `API_KEY` environment variable.
    /// A missing or blank key is a configuration error.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(API_KEY_ENV).map_err(|_| {
                Error::configuration(format!(
                    "API key not provided and {API_KEY_ENV} environment variable not set"
                ))
            })?,
        };
        if api_key.trim().is_empty() {
            return Err(Error::configuration("API key is empty"));
        }
        if HeaderValue::from_str(&api_key).is_err() {
            return Err(Error::configuration(
                "API key contains characters not allowed in a header",
            ));
        }

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Url::parse(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
        })
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| Error::configuration("API key is not a valid header value"))?;
        headers.insert("x-goog-api-key", key);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ApiErrorBody>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::transport(
                    format!("Failed to read error response: {e}"),
                    Some(status_code),
                    Some(Box::new(e)),
                );
            }
        };

        let message = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error)
            .and_then(|e| e.message.or(e.status))
            .unwrap_or(error_body);
        Error::transport(message, Some(status_code), None)
    }

    /// Send a request and stream back the response chunks.
    pub async fn stream_generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ChunkStream> {
        let url = format!("{}models/{}:streamGenerateContent?alt=sse", self.base_url, model);
        CLIENT_REQUESTS.click();
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .headers(self.default_headers()?)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::transport(
                        format!(
                            "Request timed out after {}s: {e}",
                            self.timeout.as_secs_f64()
                        ),
                        None,
                        Some(Box::new(e)),
                    )
                } else {
                    Error::transport(format!("Request failed: {e}"), None, Some(Box::new(e)))
                }
            })?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        Ok(Box::pin(process_sse(Box::pin(response.bytes_stream()))))
    }
}

#[async_trait::async_trait]
impl ChatBackend for GeminiClient {
    async fn stream_reply(&self, request: ChatRequest) -> Result<DeltaStream> {
        let body = GenerateContentRequest::new(
            request.contents,
            request.system_instruction.as_deref(),
            request.thinking_budget,
        );
        let chunks = self.stream_generate(&request.model, &body).await?;
        let deltas = chunks.filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) => {
                    let text = chunk.text();
                    (!text.is_empty()).then_some(Ok(text))
                }
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(deltas))
    }
}
