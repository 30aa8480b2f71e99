//! Key issuance, validation and reporting endpoints

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use crate::api::extract::ClientContext;
use crate::api::state::AppState;
use crate::api::types::{
    ApiError, IssueKeyResponse, KeyStatusResponse, Query, ValidateKeyQuery, ValidateKeyResponse,
};
use crate::domain::KeyStats;

const LANDING_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Access key</title>
<style>
body { font-family: system-ui, sans-serif; max-width: 32rem; margin: 4rem auto; padding: 0 1rem; }
code { background: #f2f2f2; padding: 0.1rem 0.3rem; }
</style>
</head>
<body>
<h1>Access key</h1>
<p>Keys are handed out through the official link only. Open that link to
receive a key valid for 24 hours.</p>
<p>Already have one? Check it with <code>/api/keys/validate?key=YOUR_KEY</code>.</p>
</body>
</html>
"#;

/// Routes under `/api/keys`
pub fn create_keys_router() -> Router<AppState> {
    Router::new()
        .route("/", get(issue_key).post(issue_key))
        .route("/validate", get(validate_key).layer(validation_cors()))
        .route("/status", get(key_status))
        .route("/stats", get(key_stats))
}

/// Validation is called from third-party pages, so any origin may read it
fn validation_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
}

pub async fn landing_page() -> impl IntoResponse {
    Html(LANDING_PAGE)
}

/// GET|POST /api/keys
pub async fn issue_key(
    State(state): State<AppState>,
    client: ClientContext,
) -> Result<Json<IssueKeyResponse>, ApiError> {
    let issued = state
        .issuance
        .issue(&client.provenance, &client.identity)
        .await?;

    Ok(Json(IssueKeyResponse::from(&issued.key)))
}

/// GET /api/keys/validate?key=TOKEN
pub async fn validate_key(
    State(state): State<AppState>,
    client: ClientContext,
    Query(query): Query<ValidateKeyQuery>,
) -> Result<(StatusCode, Json<ValidateKeyResponse>), ApiError> {
    let Some(raw) = query.key.filter(|k| !k.trim().is_empty()) else {
        debug!("Validation request without a key");
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ValidateKeyResponse::missing_key()),
        ));
    };

    let identity = state.bind_identity.then_some(&client.identity);
    let outcome = state.validation.check(&raw, identity).await?;

    Ok((StatusCode::OK, Json(outcome.into())))
}

/// GET /api/keys/status
pub async fn key_status(
    State(state): State<AppState>,
    client: ClientContext,
) -> Result<Json<KeyStatusResponse>, ApiError> {
    let status = state.validation.status(&client.identity).await?;
    Ok(Json(status.into()))
}

/// GET /api/keys/stats
pub async fn key_stats(State(state): State<AppState>) -> Result<Json<KeyStats>, ApiError> {
    Ok(Json(state.validation.stats().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::domain::key::MockKeyStore;
    use crate::domain::{AccessGate, DomainError, KeyStore};
    use crate::infrastructure::key::{InMemoryKeyStore, IssuanceService, ValidationService};

    fn state_with(store: Arc<dyn KeyStore>) -> AppState {
        AppState::new(
            IssuanceService::new(store.clone(), AccessGate::new(["trusted.example"])),
            ValidationService::new(store),
        )
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .nest("/api/keys", create_keys_router())
            .with_state(state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_is_bad_request() {
        let app = app(state_with(Arc::new(InMemoryKeyStore::new())));

        for uri in ["/api/keys/validate", "/api/keys/validate?key=", "/api/keys/validate?key=%20"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = body_json(response).await;
            assert_eq!(json["valid"], false);
            assert_eq!(json["reason"], "missing key");
        }
    }

    #[tokio::test]
    async fn test_issue_then_status() {
        let app = app(state_with(Arc::new(InMemoryKeyStore::new())));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/keys")
                    .header("referer", "https://trusted.example/")
                    .header("x-forwarded-for", "203.0.113.5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let issued = body_json(response).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/keys/status")
                    .header("x-forwarded-for", "203.0.113.5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = body_json(response).await;

        assert_eq!(status["active"], true);
        assert!(status.get("token").is_none());
        assert_eq!(status["expiresAt"], issued["expiresAt"]);
    }

    #[tokio::test]
    async fn test_store_outage_is_service_unavailable() {
        let mut store = MockKeyStore::new();
        store
            .expect_stats()
            .returning(|_| Err(DomainError::storage("connection refused")));

        let response = app(state_with(Arc::new(store)))
            .oneshot(
                Request::builder()
                    .uri("/api/keys/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["error"], "store_unavailable");
    }
}
