//! Query string extractor that rejects with the API error format

use axum::{
    extract::{FromRequestParts, Query as AxumQuery},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use super::error::ApiError;

/// Wrapper around `axum::extract::Query` whose rejection is a JSON error
#[derive(Debug, Clone, Copy, Default)]
pub struct Query<T>(pub T);

impl<T> Query<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Query<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Rejection for unparseable query strings
#[derive(Debug)]
pub struct QueryRejection {
    message: String,
}

impl IntoResponse for QueryRejection {
    fn into_response(self) -> Response {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_query", self.message).into_response()
    }
}

impl<S, T> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = QueryRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AxumQuery::<T>::from_request_parts(parts, state).await {
            Ok(AxumQuery(value)) => Ok(Query(value)),
            Err(rejection) => Err(QueryRejection {
                message: format!("Invalid query string: {}", rejection.body_text()),
            }),
        }
    }
}
