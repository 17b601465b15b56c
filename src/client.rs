//! Core client traits and error types.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;

use crate::model::{FaqCatalog, Language};

/// Shown when the backend rejects a request with HTTP 429.
pub const TOO_MANY_REQUESTS_MESSAGE: &str =
    "Too many requests. Please wait a moment and try again.";

/// Shown when the backend reports that answering took too long.
pub const TIMEOUT_MESSAGE: &str =
    "The request took too long to answer. Please try again with a shorter question.";

/// Shown when the backend could not be reached at all.
pub const NETWORK_MESSAGE: &str = "Sorry, something went wrong. Please try again later.";

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Upstream timeout: {0}")]
    Timeout(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Text to show in the chat in place of an answer.
    ///
    /// Status errors surface the most specific detail the backend gave;
    /// everything else maps to a fixed message.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::TooManyRequests => TOO_MANY_REQUESTS_MESSAGE.to_string(),
            ClientError::Timeout(_) => TIMEOUT_MESSAGE.to_string(),
            ClientError::Status { detail, .. } => format!("Error: {}", detail),
            ClientError::ProviderError(detail) => format!("Error: {}", detail),
            ClientError::Http(_) | ClientError::Parse(_) | ClientError::Config(_) => {
                NETWORK_MESSAGE.to_string()
            }
        }
    }
}

/// Raw body of a streaming response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Client trait for a Q&A backend.
///
/// Implement this trait to point the chat session at another backend.
///
/// # Required Methods
/// - `ask`: Send a question and wait for the whole answer
/// - `faqs`: Fetch the frequently asked questions
/// - `translated_faqs`: Fetch the frequently asked questions in another language
///
/// # Example
/// ```rust,ignore
/// struct Canned;
///
/// #[async_trait]
/// impl Client for Canned {
///     async fn ask(&self, _message: &str) -> Result<String, ClientError> {
///         Ok("Open 8-5.".to_string())
///     }
///
///     async fn faqs(&self) -> Result<FaqCatalog, ClientError> {
///         Ok(FaqCatalog::Flat(vec![]))
///     }
///
///     async fn translated_faqs(&self, _language: Language) -> Result<FaqCatalog, ClientError> {
///         self.faqs().await
///     }
/// }
/// ```
#[async_trait]
pub trait Client: Send + Sync {
    /// Send a question to the non-streaming endpoint.
    ///
    /// # Returns
    /// The answer text, or an error already classified for display
    async fn ask(&self, message: &str) -> Result<String, ClientError>;

    /// Fetch the FAQ catalog in the default language.
    async fn faqs(&self) -> Result<FaqCatalog, ClientError>;

    /// Fetch the FAQ catalog translated into `language`.
    async fn translated_faqs(&self, language: Language) -> Result<FaqCatalog, ClientError>;
}

/// Extension trait for streaming support.
///
/// Backends that can stream answers implement this trait in addition to
/// `Client`.
#[async_trait]
pub trait StreamingClient: Client {
    /// Send a question to the streaming endpoint.
    ///
    /// # Returns
    /// The event-stream body as raw bytes, once the response status is known
    /// to be successful
    async fn ask_stream(&self, message: &str) -> Result<ByteStream, ClientError>;
}
