//! HTTP plumbing shared by every Q&A endpoint: client construction and URL
//! joining.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;

use crate::client::ClientError;
use crate::options::{HttpTransport, TransportOptions};

/// Build a configured HTTP client from transport options.
///
/// Applies the request timeout, the proxy and the extra headers as client
/// defaults. A proxy or header that does not parse is a configuration error.
///
/// # Example
/// ```ignore
/// let client = build_http_client(&transport_options)?;
/// ```
pub fn build_http_client(
    transport_options: &TransportOptions<HttpTransport>,
) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    let provider = &transport_options.provider;
    if let Some(proxy_url) = &provider.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy {}: {}", proxy_url, e)))?;
        builder = builder.proxy(proxy);
    }

    let headers = default_headers(provider)?;
    if !headers.is_empty() {
        builder = builder.default_headers(headers);
    }

    Ok(builder.build()?)
}

/// Parse the configured extra headers.
fn default_headers(provider: &HttpTransport) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    for (key, value) in provider.extra_headers.iter().flatten() {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ClientError::Config(format!("invalid header name: {}", key)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ClientError::Config(format!("invalid value for header {}", key)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Join `path` onto the configured base URL.
pub fn endpoint_url(provider: &HttpTransport, path: &str) -> Result<String, ClientError> {
    let base = provider
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|base| !base.is_empty())
        .ok_or_else(|| ClientError::Config("Base URL is required".to_string()))?;
    Ok(format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}
