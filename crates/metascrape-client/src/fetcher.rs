use std::time::Duration;

use metascrape_core::error::AppError;
use metascrape_core::gateway::{FetchRequest, FetchResponse, Method};
use metascrape_core::traits::Fetcher;
use reqwest::Client;

/// HTTP fetcher using reqwest.
///
/// One instance per site: the proxy and timeout are fixed at construction,
/// headers and cookies come with each request. Certificate validation is
/// disabled because several catalogue mirrors serve broken chains.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    /// Build a fetcher with a request timeout and an optional
    /// `http`/`https`/`socks5` proxy.
    pub fn with_options(timeout: Duration, proxy: Option<&str>) -> Result<Self, AppError> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true);

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| AppError::ConfigError(format!("Invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, AppError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = request.cookie_header() {
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::debug!(method = %request.method, url = %request.url, "Sending request");

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;

        tracing::debug!(url = %request.url, status, bytes = body.len(), "Received response");

        Ok(FetchResponse::new(status, body.to_vec()))
    }
}
