//! Q&A backend client implementation.
//!
//! Endpoints, relative to the configured base URL:
//! - `POST /qa` answers a question in one JSON envelope
//! - `POST /qa/stream` answers a question as an event stream, one token per frame
//! - `GET /faqs` and `GET /faqs/translate?lang=<code>` list suggested questions

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::client::{ByteStream, Client, ClientError, StreamingClient};
use crate::http::{build_http_client, endpoint_url};
use crate::model::{AnswerEnvelope, FaqCatalog, Language, QuestionRequest};
use crate::options::{HttpTransport, TransportOptions};

const TIMEOUT_CODE: &str = "timeout";

/// Q&A client using HTTP transport.
#[derive(Debug, Clone)]
pub struct QaClient {
    transport_options: TransportOptions<HttpTransport>,
}

impl QaClient {
    pub fn new(transport_options: TransportOptions<HttpTransport>) -> Self {
        Self { transport_options }
    }

    pub fn transport_options(&self) -> &TransportOptions<HttpTransport> {
        &self.transport_options
    }

    fn endpoint(&self, path: &str) -> Result<String, ClientError> {
        endpoint_url(&self.transport_options.provider, path)
    }

    fn post_question(&self, path: &str, message: &str) -> Result<reqwest::RequestBuilder, ClientError> {
        let url = self.endpoint(path)?;
        let http_client = build_http_client(&self.transport_options)?;

        Ok(http_client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(&QuestionRequest { user_message: message }))
    }

    async fn get_faqs(&self, language: Option<Language>) -> Result<FaqCatalog, ClientError> {
        let http_client = build_http_client(&self.transport_options)?;
        let req = match language {
            Some(language) => http_client
                .get(self.endpoint("faqs/translate")?)
                .query(&[("lang", language.code())]),
            None => http_client.get(self.endpoint("faqs")?),
        };

        let response = Self::check_status(req.send().await?).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Pass successful responses through; turn anything else into an error.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::handle_error_response(status, &body))
    }

    /// Classify a non-success response.
    ///
    /// The detail is the most specific one available: a `detail`, `error` or
    /// `message` field of a JSON body, then the raw body, then the status text.
    fn handle_error_response(status: StatusCode, body: &str) -> ClientError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return ClientError::TooManyRequests;
        }

        let detail = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(ErrorBody::into_detail)
            .or_else(|| Some(body.trim().to_string()).filter(|text| !text.is_empty()))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

        ClientError::Status {
            status: status.as_u16(),
            detail,
        }
    }
}

/// Unwrap a non-streaming answer, classifying application-level errors.
fn answer_from(envelope: AnswerEnvelope) -> Result<String, ClientError> {
    match envelope {
        AnswerEnvelope::Success { answer } => Ok(answer),
        AnswerEnvelope::Error {
            code,
            detail,
            message,
        } => {
            let detail = detail.or(message).unwrap_or_else(|| "Unknown error".to_string());
            if code.as_deref() == Some(TIMEOUT_CODE) {
                Err(ClientError::Timeout(detail))
            } else {
                Err(ClientError::ProviderError(detail))
            }
        }
    }
}

#[async_trait]
impl Client for QaClient {
    async fn ask(&self, message: &str) -> Result<String, ClientError> {
        let response = self.post_question("qa", message)?.send().await?;
        let response = Self::check_status(response).await?;

        let envelope: AnswerEnvelope = serde_json::from_str(&response.text().await?)?;
        answer_from(envelope)
    }

    async fn faqs(&self) -> Result<FaqCatalog, ClientError> {
        self.get_faqs(None).await
    }

    async fn translated_faqs(&self, language: Language) -> Result<FaqCatalog, ClientError> {
        self.get_faqs(Some(language)).await
    }
}

#[async_trait]
impl StreamingClient for QaClient {
    async fn ask_stream(&self, message: &str) -> Result<ByteStream, ClientError> {
        let response = self
            .post_question("qa/stream", message)?
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        Ok(Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(ClientError::from))))
    }
}

// --- Error body ---

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

impl ErrorBody {
    fn into_detail(self) -> Option<String> {
        [self.detail, self.error, self.message]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                Value::Null => None,
                Value::String(text) if text.trim().is_empty() => None,
                Value::String(text) => Some(text),
                other => Some(other.to_string()),
            })
    }
}
