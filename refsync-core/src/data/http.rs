//! HTTP transport over the table API.
//!
//! Appends the API key to every datatable request, retries rate limits and
//! server errors with exponential backoff, and streams bulk archives straight
//! into the caller's writer.

use super::provider::FetchError;
use super::transport::Transport;
use crate::config::ApiConfig;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, warn};

/// Blocking HTTP transport.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            FetchError::Config(format!(
                "no API key (set api.api_key or {})",
                crate::config::API_KEY_ENV
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("refsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Send a request, retrying 429 and 5xx.
    fn send_with_retry(
        &self,
        label: &str,
        build: impl Fn() -> reqwest::blocking::RequestBuilder,
    ) -> Result<Response, FetchError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                warn!(path = label, attempt, ?delay, "retrying request");
                std::thread::sleep(delay);
            }

            match build().send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }

                    let error = FetchError::Status {
                        status: status.as_u16(),
                        path: label.to_string(),
                        body: resp.text().unwrap_or_default(),
                    };
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_error = Some(error);
                        continue;
                    }
                    return Err(error);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(FetchError::Network(e.to_string()));
                        continue;
                    }
                    return Err(FetchError::Network(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Network("max retries exceeded".into())))
    }
}

impl Transport for HttpTransport {
    fn get(&self, path: &str, params: &[(String, String)]) -> Result<String, FetchError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(path, params = params.len(), "GET");

        let resp = self.send_with_retry(path, || {
            self.client
                .get(&url)
                .query(params)
                .query(&[("api_key", self.api_key.as_str())])
        })?;

        resp.text()
            .map_err(|e| FetchError::Network(format!("failed to read body of {path}: {e}")))
    }

    fn download(&self, link: &str, dest: &mut dyn Write) -> Result<u64, FetchError> {
        // Export links are pre-signed; the API key is not sent along.
        let mut resp = self.send_with_retry("bulk download", || self.client.get(link))?;
        let bytes = std::io::copy(&mut resp, dest)?;
        dest.flush()?;
        debug!(bytes, "archive downloaded");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = ApiConfig {
            api_key: String::new(),
            ..ApiConfig::default()
        };
        // Only meaningful when the environment does not provide a key.
        if std::env::var(crate::config::API_KEY_ENV).is_err() {
            assert!(matches!(HttpTransport::new(&config), Err(FetchError::Config(_))));
        }
    }

    #[test]
    fn base_url_is_normalized() {
        let config = ApiConfig {
            base_url: "https://example.test/api/v3/".into(),
            api_key: "k".into(),
            ..ApiConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.base_url, "https://example.test/api/v3");
    }
}
