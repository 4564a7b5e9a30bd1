//! REST error taxonomy.
//!
//! Every failure path yields a typed error; there is no "null on
//! failure" anywhere in this crate, and nothing here ever terminates the
//! process.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    /// 401: the credential is missing, expired, or lacks the scope.
    #[error("unauthorized")]
    Unauthorized,

    /// 404: the resource does not exist.
    #[error("not found")]
    NotFound,

    /// 429: over the request budget. `retry_after` comes from the
    /// Retry-After header when the server sent one.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// 5xx: the service is having a bad time; retryable.
    #[error("service unavailable")]
    ServiceUnavailable,

    /// Any other non-success status, with the server's message if the
    /// body carried one.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body was not the JSON we expected.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Connection-level failure (DNS, TLS, timeout, ...).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RestError {
    /// Map a non-success status (plus whatever the body said) to an error.
    pub(crate) fn from_status(
        status: u16,
        retry_after: Option<Duration>,
        message: String,
    ) -> Self {
        match status {
            401 => RestError::Unauthorized,
            404 => RestError::NotFound,
            429 => RestError::RateLimited { retry_after },
            500..=599 => RestError::ServiceUnavailable,
            _ => RestError::Api { status, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            RestError::from_status(401, None, String::new()),
            RestError::Unauthorized
        ));
        assert!(matches!(
            RestError::from_status(404, None, String::new()),
            RestError::NotFound
        ));
        assert!(matches!(
            RestError::from_status(429, Some(Duration::from_secs(3)), String::new()),
            RestError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(3)
        ));
        assert!(matches!(
            RestError::from_status(503, None, String::new()),
            RestError::ServiceUnavailable
        ));
        match RestError::from_status(418, None, "teapot".into()) {
            RestError::Api { status, message } => {
                assert_eq!(status, 418);
                assert_eq!(message, "teapot");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }
}
