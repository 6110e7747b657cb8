//! Blocking HTTP transport shared by the span exporters
//!
//! Wraps an async `reqwest` client in a current-thread tokio runtime so the
//! synchronous hook pipeline can push a batch and wait for the response.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;

use crate::error::{Error, Result};

pub struct HttpExporter {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpExporter {
    /// Create a client that sends `headers` on every request.
    pub fn new(timeout: Duration, headers: HeaderMap) -> Result<Self> {
        let mut headers = headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Provider(format!("failed to create HTTP client: {}", e)))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Provider(format!("failed to create runtime: {}", e)))?;

        Ok(Self { client, runtime })
    }

    /// Send `body` as JSON and wait for a 2xx response.
    pub fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &T,
    ) -> Result<()> {
        self.runtime.block_on(async {
            let response = self
                .client
                .request(method, url)
                .json(body)
                .send()
                .await
                .map_err(|e| Error::Export(format!("HTTP request to {} failed: {}", url, e)))?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Export(format!(
                "{} rejected export ({}): {}",
                url, status, error_text
            )))
        })
    }
}

/// Build a header map from `(name, value)` pairs.
pub fn header_map<I, K, V>(pairs: I) -> Result<HeaderMap>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_ref().as_bytes()).map_err(|e| {
            Error::Config(format!("invalid header name {:?}: {}", name.as_ref(), e))
        })?;
        let value = HeaderValue::from_str(value.as_ref())
            .map_err(|e| Error::Config(format!("invalid value for header {}: {}", name, e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map() {
        let headers = header_map([("x-api-key", "secret"), ("X-Team", "obs")]).unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "secret");
        assert_eq!(headers.get("x-team").unwrap(), "obs");
    }

    #[test]
    fn test_header_map_rejects_invalid_name() {
        assert!(matches!(
            header_map([("bad header", "v")]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unreachable_endpoint_is_export_error() {
        let exporter = HttpExporter::new(Duration::from_secs(2), HeaderMap::new()).unwrap();
        let result = exporter.send_json(
            Method::POST,
            "http://127.0.0.1:1/v1/traces",
            &serde_json::json!({}),
        );
        assert!(matches!(result, Err(Error::Export(_))));
    }
}
