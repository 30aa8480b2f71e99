//! Access token format validation

use thiserror::Error;

/// Errors that can occur while validating an access token string
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TokenFormatError {
    #[error("Access token cannot be empty")]
    Empty,

    #[error("Access token must be between {min} and {max} characters, got {actual}")]
    InvalidLength { min: usize, max: usize, actual: usize },

    #[error("Access token must have an even number of characters")]
    OddLength,

    #[error("Access token contains invalid character: '{0}'. Only uppercase hexadecimal is allowed")]
    InvalidCharacter(char),
}

/// Smallest number of random bytes a generator may use
pub const MIN_TOKEN_BYTES: usize = 6;

/// Largest number of random bytes a generator may use
pub const MAX_TOKEN_BYTES: usize = 64;

/// Validate an access token
///
/// Rules:
/// - Cannot be empty
/// - Two hex characters per random byte, between 6 and 64 bytes
/// - Only `0-9` and `A-F`
pub fn validate_access_token(token: &str) -> Result<(), TokenFormatError> {
    if token.is_empty() {
        return Err(TokenFormatError::Empty);
    }

    let min = MIN_TOKEN_BYTES * 2;
    let max = MAX_TOKEN_BYTES * 2;

    if token.len() < min || token.len() > max {
        return Err(TokenFormatError::InvalidLength {
            min,
            max,
            actual: token.len(),
        });
    }

    if token.len() % 2 != 0 {
        return Err(TokenFormatError::OddLength);
    }

    if let Some(c) = token
        .chars()
        .find(|c| !matches!(c, '0'..='9' | 'A'..='F'))
    {
        return Err(TokenFormatError::InvalidCharacter(c));
    }

    Ok(())
}

/// Canonicalize user input into the stored token form (trimmed, uppercase)
pub fn normalize_access_token(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
