//! Access token generation
//!
//! Tokens are random bytes from the OS-seeded CSPRNG rendered as uppercase
//! hexadecimal. Uniqueness across the store is enforced by the store.

use rand::RngCore;

use crate::domain::key::{AccessToken, MAX_TOKEN_BYTES, MIN_TOKEN_BYTES};
use crate::domain::DomainError;

/// Default number of random bytes per token (16 hex characters)
pub const DEFAULT_TOKEN_BYTES: usize = 8;

/// Generator for access tokens
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    /// Number of random bytes to generate
    key_bytes: usize,
}

impl KeyGenerator {
    /// Create a generator producing `key_bytes` random bytes per token
    pub fn new(key_bytes: usize) -> Result<Self, DomainError> {
        if !(MIN_TOKEN_BYTES..=MAX_TOKEN_BYTES).contains(&key_bytes) {
            return Err(DomainError::configuration(format!(
                "Token byte length must be between {} and {}, got {}",
                MIN_TOKEN_BYTES, MAX_TOKEN_BYTES, key_bytes
            )));
        }

        Ok(Self { key_bytes })
    }

    pub fn key_bytes(&self) -> usize {
        self.key_bytes
    }

    /// Length of every generated token in characters
    pub fn token_length(&self) -> usize {
        self.key_bytes * 2
    }

    /// Generate a fresh candidate token
    pub fn generate(&self) -> AccessToken {
        let mut random_bytes = vec![0u8; self.key_bytes];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        AccessToken::from_generated(hex::encode_upper(&random_bytes))
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self {
            key_bytes: DEFAULT_TOKEN_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_upper_hex(s: &str) -> bool {
        s.chars().all(|c| matches!(c, '0'..='9' | 'A'..='F'))
    }

    #[test]
    fn test_default_generates_16_hex_chars() {
        let generator = KeyGenerator::default();
        let token = generator.generate();

        assert_eq!(token.as_str().len(), 16);
        assert_eq!(generator.token_length(), 16);
        assert!(is_upper_hex(token.as_str()));
    }

    #[test]
    fn test_format_holds_for_every_allowed_length() {
        for bytes in [MIN_TOKEN_BYTES, 8, 12, 32, MAX_TOKEN_BYTES] {
            let generator = KeyGenerator::new(bytes).unwrap();

            for _ in 0..20 {
                let token = generator.generate();
                assert_eq!(token.as_str().len(), bytes * 2);
                assert!(is_upper_hex(token.as_str()));
            }
        }
    }

    #[test]
    fn test_key_uniqueness() {
        let generator = KeyGenerator::default();
        let tokens: HashSet<String> = (0..1_000)
            .map(|_| generator.generate().as_str().to_string())
            .collect();

        assert_eq!(tokens.len(), 1_000);
    }

    #[test]
    fn test_rejects_out_of_range_lengths() {
        assert!(KeyGenerator::new(MIN_TOKEN_BYTES - 1).is_err());
        assert!(KeyGenerator::new(MAX_TOKEN_BYTES + 1).is_err());
        assert!(KeyGenerator::new(0).is_err());
    }
}
