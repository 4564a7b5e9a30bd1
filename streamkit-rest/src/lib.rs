//! HTTP API client plumbing for the streamkit SDK.
//!
//! Explicit configuration, typed errors, and a declarative retry policy.
//! Per-endpoint wrappers are intentionally out of scope — callers build
//! [`Request`]s for the endpoints they use.
//!
//! ```no_run
//! use streamkit_rest::{execute_with_retry, Request, RestClient, RestConfig, RetryPolicy};
//! use streamkit_common::Credential;
//!
//! # async fn run() -> Result<(), streamkit_rest::RestError> {
//! let client = RestClient::new(RestConfig::new("https://api.example.com/v1"))?;
//! let credential = Credential::new("alice", "token");
//! let req = Request::get("users").query("login", "somestreamer");
//!
//! let user: serde_json::Value =
//!     execute_with_retry(&RetryPolicy::default(), || client.request(&req, &credential)).await?;
//! # let _ = user;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod retry;

pub use client::{Method, Request, RestClient, RestConfig};
pub use error::RestError;
pub use retry::{execute_with_retry, RetryPolicy};
