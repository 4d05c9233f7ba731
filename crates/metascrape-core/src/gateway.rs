//! Request/response types for the fetch gateway.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One HTTP request as issued by an adapter.
///
/// Proxy and timeout belong to the gateway instance, not to the request.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub cookies: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: &BTreeMap<String, String>) -> Self {
        self.headers
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn cookies(mut self, cookies: &[(String, String)]) -> Self {
        self.cookies.extend_from_slice(cookies);
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, AppError> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers
            .insert("Content-Type".into(), "application/json".into());
        Ok(self)
    }

    /// The `Cookie` header value for this request, if it carries cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Raw response: status and body bytes, no decoding applied.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Turn a 4xx/5xx status into an [`AppError::HttpError`].
    pub fn error_for_status(self, url: &str) -> Result<Self, AppError> {
        if self.status >= 400 {
            return Err(AppError::HttpError(format!("HTTP {} for {}", self.status, url)));
        }
        Ok(self)
    }
}
