//! Request and response types shared by the HTTP handlers

pub mod error;
pub mod keys;
pub mod query;

pub use error::{ApiError, ApiErrorResponse};
pub use keys::{IssueKeyResponse, KeyStatusResponse, ValidateKeyQuery, ValidateKeyResponse};
pub use query::Query;
