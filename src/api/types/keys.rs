//! Key endpoint request and response bodies
//!
//! Every timestamp is milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};

use crate::domain::{AccessKey, ValidationOutcome};
use crate::infrastructure::key::KeyStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueKeyResponse {
    pub token: String,
    pub expires_at: i64,
    pub created_at: i64,
}

impl From<&AccessKey> for IssueKeyResponse {
    fn from(key: &AccessKey) -> Self {
        Self {
            token: key.token().to_string(),
            expires_at: key.expires_at().timestamp_millis(),
            created_at: key.created_at().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidateKeyQuery {
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateKeyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidateKeyResponse {
    pub fn missing_key() -> Self {
        Self {
            valid: false,
            expires_at: None,
            reason: Some("missing key".to_string()),
        }
    }
}

impl From<ValidationOutcome> for ValidateKeyResponse {
    fn from(outcome: ValidationOutcome) -> Self {
        Self {
            valid: outcome.is_valid(),
            expires_at: outcome.expires_at().map(|t| t.timestamp_millis()),
            reason: outcome.reason().map(|r| r.as_str().to_string()),
        }
    }
}

/// Never carries the token; the identity behind it is client-supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatusResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Milliseconds left
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
}

impl From<KeyStatus> for KeyStatusResponse {
    fn from(status: KeyStatus) -> Self {
        match status {
            KeyStatus::Inactive => Self {
                active: false,
                expires_at: None,
                remaining: None,
            },
            KeyStatus::Active { key, remaining } => Self {
                active: true,
                expires_at: Some(key.expires_at().timestamp_millis()),
                remaining: Some(remaining.num_milliseconds()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccessKey, AccessToken, Identity, InvalidReason};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_validate_response_shapes() {
        let valid = ValidateKeyResponse::from(ValidationOutcome::Valid {
            expires_at: Utc.timestamp_millis_opt(5_000).unwrap(),
        });
        let json = serde_json::to_value(&valid).unwrap();
        assert_eq!(json, serde_json::json!({"valid": true, "expiresAt": 5_000}));

        let expired = ValidateKeyResponse::from(ValidationOutcome::Invalid(InvalidReason::Expired));
        let json = serde_json::to_value(&expired).unwrap();
        assert_eq!(json, serde_json::json!({"valid": false, "reason": "expired"}));

        let json = serde_json::to_value(ValidateKeyResponse::missing_key()).unwrap();
        assert_eq!(json, serde_json::json!({"valid": false, "reason": "missing key"}));
    }

    #[test]
    fn test_inactive_status_has_no_details() {
        let json = serde_json::to_value(KeyStatusResponse::from(KeyStatus::Inactive)).unwrap();
        assert_eq!(json, serde_json::json!({"active": false}));
    }

    #[test]
    fn test_active_status_omits_token() {
        let key = AccessKey::new(
            AccessToken::new("ABCDEF0123456789").unwrap(),
            Identity::new("203.0.113.5"),
            Utc.timestamp_millis_opt(1_000).unwrap(),
            Duration::milliseconds(9_000),
        );
        let status = KeyStatus::Active {
            key,
            remaining: Duration::milliseconds(4_000),
        };

        let json = serde_json::to_value(KeyStatusResponse::from(status)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"active": true, "expiresAt": 10_000, "remaining": 4_000})
        );
    }
}
