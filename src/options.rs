//! Generic options structures for transport and rendering configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Number of tokens accumulated before a soft flush.
pub const DEFAULT_TOKENS_PER_CHUNK: usize = 40;

/// Distance from the end of the surface, in pixels, under which incremental
/// flushes keep the view pinned to the bottom.
pub const DEFAULT_SCROLL_THRESHOLD: f64 = 500.0;

/// Token the backend sends in place of a literal newline.
pub const DEFAULT_NEWLINE_PLACEHOLDER: &str = "__NEWLINE__";

/// Payload of the frame that closes a stream. Carries no content.
pub const DEFAULT_END_SENTINEL: &str = "end-of-stream";

const DEFAULT_TYPEWRITER_DELAY: Duration = Duration::from_millis(15);

/// Generic transport options containing truly generic transport fields
/// and provider-specific transport configuration.
///
/// # Type Parameters
/// - `T`: Provider-specific transport options type
///
/// # Example
/// ```rust
/// use qachat::options::{HttpTransport, TransportOptions};
/// use std::time::Duration;
///
/// let options = TransportOptions {
///     timeout: Some(Duration::from_secs(30)),
///     provider: HttpTransport {
///         base_url: Some("https://example.org/wichita/api".to_string()),
///         proxy: None,
///         extra_headers: None,
///     },
/// };
/// ```
#[derive(Debug, Clone)]
pub struct TransportOptions<T> {
    /// Request timeout. `None` waits for the backend indefinitely.
    pub timeout: Option<Duration>,

    /// Provider-specific transport options
    pub provider: T,
}

/// HTTP-specific transport options.
/// Used as the provider field in `TransportOptions<HttpTransport>`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    /// Base URL of the Q&A API, e.g. `https://host/wichita/api`
    pub base_url: Option<String>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl HttpTransport {
    /// Create new HTTP transport options pointing at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            proxy: None,
            extra_headers: None,
        }
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set extra headers.
    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}

impl<T> TransportOptions<T> {
    /// Create new transport options with provider-specific configuration.
    pub fn new(provider: T) -> Self {
        Self {
            timeout: None,
            provider,
        }
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options controlling how a reply is painted on a surface.
///
/// # Example
/// ```rust
/// use qachat::options::RenderOptions;
///
/// let options = RenderOptions::default().with_tokens_per_chunk(20);
/// assert_eq!(options.newline_placeholder, "__NEWLINE__");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderOptions {
    /// Tokens buffered before an inline (soft) flush
    pub tokens_per_chunk: usize,

    /// Pixels from the end under which incremental flushes auto-scroll
    pub scroll_threshold: f64,

    /// Control token standing for a hard line break
    pub newline_placeholder: String,

    /// Control token closing the stream
    pub end_sentinel: String,

    /// Delay between characters revealed by the typewriter
    #[serde(with = "millis")]
    pub typewriter_delay: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            tokens_per_chunk: DEFAULT_TOKENS_PER_CHUNK,
            scroll_threshold: DEFAULT_SCROLL_THRESHOLD,
            newline_placeholder: DEFAULT_NEWLINE_PLACEHOLDER.to_string(),
            end_sentinel: DEFAULT_END_SENTINEL.to_string(),
            typewriter_delay: DEFAULT_TYPEWRITER_DELAY,
        }
    }
}

impl RenderOptions {
    /// Set the soft flush threshold. Zero is treated as one.
    pub fn with_tokens_per_chunk(mut self, tokens: usize) -> Self {
        self.tokens_per_chunk = tokens.max(1);
        self
    }

    /// Set the auto-scroll threshold in pixels.
    pub fn with_scroll_threshold(mut self, pixels: f64) -> Self {
        self.scroll_threshold = pixels;
        self
    }

    /// Set the typewriter delay.
    pub fn with_typewriter_delay(mut self, delay: Duration) -> Self {
        self.typewriter_delay = delay;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_options_defaults() {
        let options = RenderOptions::default();
        assert_eq!(options.tokens_per_chunk, 40);
        assert_eq!(options.scroll_threshold, 500.0);
        assert_eq!(options.end_sentinel, "end-of-stream");
    }

    #[test]
    fn test_render_options_from_partial_json() {
        let options: RenderOptions =
            serde_json::from_str(r#"{"tokens_per_chunk": 8, "typewriter_delay": 40}"#).unwrap();
        assert_eq!(options.tokens_per_chunk, 8);
        assert_eq!(options.typewriter_delay, Duration::from_millis(40));
        assert_eq!(options.newline_placeholder, DEFAULT_NEWLINE_PLACEHOLDER);
    }

    #[test]
    fn test_tokens_per_chunk_never_zero() {
        let options = RenderOptions::default().with_tokens_per_chunk(0);
        assert_eq!(options.tokens_per_chunk, 1);
    }

    #[test]
    fn test_http_transport_headers() {
        let transport = HttpTransport::new("http://localhost:8000/api")
            .with_header("X-Widget".to_string(), "faq".to_string());
        assert_eq!(transport.base_url.as_deref(), Some("http://localhost:8000/api"));
        assert_eq!(
            transport.extra_headers.unwrap().get("X-Widget").map(String::as_str),
            Some("faq")
        );
    }
}
