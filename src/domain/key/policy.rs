//! Issuance policy

use serde::Deserialize;

/// What a repeated issuance request gets while the caller's key is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Refuse with `DuplicateActiveToken` and the remaining time
    #[default]
    Reject,
    /// Hand back the caller's existing key unchanged
    ReturnExisting,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        policy: DuplicatePolicy,
    }

    #[test]
    fn test_policy_deserialization() {
        let w: Wrapper = serde_json::from_str(r#"{"policy":"return_existing"}"#).unwrap();
        assert_eq!(w.policy, DuplicatePolicy::ReturnExisting);

        let w: Wrapper = serde_json::from_str(r#"{"policy":"reject"}"#).unwrap();
        assert_eq!(w.policy, DuplicatePolicy::Reject);
    }

    #[test]
    fn test_default_is_reject() {
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::Reject);
    }
}
