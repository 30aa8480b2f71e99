//! JSON error responses

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, KeyError};

/// Body of every non-success response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    /// Machine-readable code
    pub error: String,
    /// Human-readable explanation
    pub reason: String,
    /// Milliseconds left on the caller's active key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// API error with status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ApiErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status,
            response: ApiErrorResponse {
                error: code.into(),
                reason: reason.into(),
                remaining: None,
                expires_at: None,
            },
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", reason)
    }

    pub fn forbidden(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, code, reason)
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", reason)
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", reason)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", reason)
    }

    /// Whole seconds until the caller may retry, rounded up
    fn retry_after_secs(&self) -> Option<i64> {
        self.response
            .remaining
            .filter(|_| self.status == StatusCode::TOO_MANY_REQUESTS)
            .map(|ms| (ms + 999) / 1000)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after_secs();
        let mut response = (self.status, Json(self.response)).into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::NotFound { message } => Self::not_found(message),
            DomainError::Validation { message } => Self::bad_request(message),
            DomainError::Conflict { message } => {
                Self::new(StatusCode::CONFLICT, "conflict", message)
            }
            DomainError::Storage { message } => {
                tracing::error!(error = %message, "Key store unavailable");
                Self::unavailable("key store unavailable")
            }
            DomainError::Configuration { message } | DomainError::Internal { message } => {
                tracing::error!(error = %message, "Internal error");
                Self::internal("internal error")
            }
        }
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::GateRejected { denial } => {
                Self::forbidden("gate_rejected", denial.to_string())
            }
            KeyError::DuplicateActiveToken {
                remaining,
                expires_at,
            } => {
                let message = format!(
                    "an active key already exists for this client, retry in {} s",
                    (remaining.num_milliseconds() + 999) / 1000
                );
                let mut error =
                    Self::new(StatusCode::TOO_MANY_REQUESTS, "duplicate_active_token", message);
                error.response.remaining = Some(remaining.num_milliseconds());
                error.response.expires_at = Some(expires_at.timestamp_millis());
                error
            }
            KeyError::Store(e) => e.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.response.error, self.response.reason)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GateDenial;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_gate_rejection_is_forbidden() {
        let err: ApiError = KeyError::GateRejected {
            denial: GateDenial::UntrustedProvenance,
        }
        .into();

        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.response.error, "gate_rejected");
        assert!(err.response.remaining.is_none());
    }

    #[test]
    fn test_duplicate_is_too_many_requests_with_remaining() {
        let err: ApiError = KeyError::DuplicateActiveToken {
            remaining: Duration::milliseconds(1_500),
            expires_at: Utc.timestamp_millis_opt(10_000).unwrap(),
        }
        .into();

        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.response.remaining, Some(1_500));
        assert_eq!(err.response.expires_at, Some(10_000));

        let response = err.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_domain_error_conversion() {
        let err: ApiError = DomainError::storage("connection refused").into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.response.error, "store_unavailable");
        assert!(!err.response.reason.contains("refused"));

        let err: ApiError = DomainError::validation("bad").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = KeyError::Store(DomainError::internal("bug")).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_serialization() {
        let mut err = ApiError::new(StatusCode::TOO_MANY_REQUESTS, "duplicate_active_token", "x");
        err.response.expires_at = Some(42);

        let json = serde_json::to_value(&err.response).unwrap();
        assert_eq!(json["error"], "duplicate_active_token");
        assert_eq!(json["expiresAt"], 42);
        assert!(json.get("remaining").is_none());
    }
}
