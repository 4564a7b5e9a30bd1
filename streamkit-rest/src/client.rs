//! HTTP client plumbing.
//!
//! Endpoint wrappers live with the applications that need them; this
//! module only provides the shared mechanics — explicit configuration,
//! credential headers, and status-to-error mapping. There is no
//! process-wide state: two clients with different configs coexist.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use streamkit_common::Credential;

use crate::error::RestError;

pub use reqwest::Method;

/// Explicit per-client configuration.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// API root, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: concat!("streamkit/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// One API request, independent of any client.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

pub struct RestClient {
    http: reqwest::Client,
    config: RestConfig,
}

impl RestClient {
    pub fn new(config: RestConfig) -> Result<Self, RestError> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Execute a request and return the JSON body. Non-success statuses
    /// become typed [`RestError`]s; an empty body decodes to JSON null.
    pub async fn request(&self, req: &Request, credential: &Credential) -> Result<Value, RestError> {
        let url = join_url(&self.config.base_url, &req.path);
        let mut builder = self
            .http
            .request(req.method.clone(), &url)
            .bearer_auth(&credential.token)
            .query(&req.query);
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %req.method, url = %url, "api request");
        let response = builder.send().await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(text);
            return Err(RestError::from_status(status.as_u16(), retry_after, message));
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Execute a request and decode the body into `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        req: &Request,
        credential: &Credential,
    ) -> Result<T, RestError> {
        let value = self.request(req, credential).await?;
        Ok(serde_json::from_value(value)?)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
