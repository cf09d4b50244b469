//! Request/response channel to the developer portal
//!
//! The portal only accepts POST bodies. GET and DELETE semantics are tunneled
//! through `X-HTTP-Method-Override`. Headers are built fresh for every call by
//! [`RequestHeaders`]; no header state outlives a request.

use crate::config::ClientConfig;
use crate::error::{PortalError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::future::Future;
use std::time::Duration;

pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";
pub const SESSION_COOKIE_NAME: &str = "myacinfo";
const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

/// Method carried in the override header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodOverride {
    Get,
    Delete,
}

impl MethodOverride {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Delete => "DELETE",
        }
    }
}

/// Per-call header set for the JSON certificate API.
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    xcode_version: String,
    session: Option<String>,
    method_override: Option<MethodOverride>,
}

impl RequestHeaders {
    pub fn new(xcode_version: impl Into<String>) -> Self {
        Self {
            xcode_version: xcode_version.into(),
            session: None,
            method_override: None,
        }
    }

    /// Attach the `myacinfo` session cookie
    #[must_use]
    pub fn session(mut self, token: &str) -> Self {
        self.session = Some(token.to_string());
        self
    }

    #[must_use]
    pub fn method_override(mut self, method: MethodOverride) -> Self {
        self.method_override = Some(method);
        self
    }

    pub fn build(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        insert(&mut headers, "accept", JSON_API_CONTENT_TYPE)?;
        insert(&mut headers, "content-type", JSON_API_CONTENT_TYPE)?;
        insert(&mut headers, "x-apple-app-info", "com.apple.gs.xcode.auth")?;
        insert(&mut headers, "x-xcode-version", &self.xcode_version)?;
        insert(&mut headers, "user-agent", "Xcode")?;

        if let Some(token) = &self.session {
            let mut value = HeaderValue::from_str(&format!("{SESSION_COOKIE_NAME}={token}"))
                .map_err(|_| {
                    PortalError::InvalidConfig(
                        "Session token contains characters not allowed in a header".to_string(),
                    )
                })?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::COOKIE, value);
        }

        if let Some(method) = self.method_override {
            insert(&mut headers, METHOD_OVERRIDE_HEADER, method.as_str())?;
        }

        Ok(headers)
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| PortalError::InvalidConfig(format!("Invalid value for header {name}: {e}")))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// A single outbound call.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RpcRequest {
    /// Value of the method-override header, if any
    #[must_use]
    pub fn method_override(&self) -> Option<&str> {
        self.headers
            .get(METHOD_OVERRIDE_HEADER)
            .and_then(|v| v.to_str().ok())
    }
}

/// Raw response: status code and decompressed body.
#[derive(Debug, Clone)]
pub struct RpcResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RpcResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport used by the certificate client.
///
/// Every request is sent as an HTTP POST; implementations must not add
/// retries.
pub trait RpcChannel: Send + Sync {
    fn send(&self, request: RpcRequest) -> impl Future<Output = Result<RpcResponse>> + Send;
}

/// `reqwest`-backed channel with gzip decoding and explicit timeouts.
#[derive(Debug, Clone)]
pub struct HttpChannel {
    client: reqwest::Client,
}

impl HttpChannel {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client, keeping its timeout settings.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl RpcChannel for HttpChannel {
    async fn send(&self, request: RpcRequest) -> Result<RpcResponse> {
        tracing::debug!(
            url = %request.url,
            method_override = request.method_override().unwrap_or("POST"),
            body_len = request.body.len(),
            "sending portal request"
        );

        let response = self
            .client
            .post(&request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        tracing::debug!(status, body_len = body.len(), "portal response received");

        Ok(RpcResponse { status, body })
    }
}
