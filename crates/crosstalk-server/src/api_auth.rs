//! Account registration and login handlers.
//!
//! These are thin HTTP endpoints over the identity store. Login does not
//! mint a token; the WebSocket layer binds a connection to an identity via
//! the `register_user` event, and these endpoints exist so clients can
//! create and check credentials before opening a session.

use crate::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use crosstalk_types::DEFAULT_SOURCE_LANGUAGE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Request body for account registration and login.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
    /// Preferred spoken language, registration only.
    #[serde(default)]
    pub preferred_language: Option<String>,
}

/// Response body for successful registration or login.
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialsResponse {
    pub message: String,
    pub username: String,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Handler for `POST /auth/register`.
pub async fn register_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<CredentialsResponse>, ApiError> {
    let username = payload.username.trim().to_string();
    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    let preferred_language = payload
        .preferred_language
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SOURCE_LANGUAGE.to_string());

    let created = {
        let pool = state.pool.clone();
        let username = username.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApiError::InternalServerError(e.to_string()))?;
            crosstalk_identity::create_user(&conn, &username, &payload.password, &preferred_language)
                .map_err(|e| ApiError::InternalServerError(e.to_string()))
        })
        .await
        .map_err(|e| ApiError::InternalServerError(e.to_string()))??
    };

    if !created {
        return Err(ApiError::BadRequest("username is already taken".to_string()));
    }

    tracing::info!(username = %username, "account created");
    Ok(Json(CredentialsResponse {
        message: "registered".to_string(),
        username,
    }))
}

/// Handler for `POST /auth/login`.
pub async fn login_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<CredentialsResponse>, ApiError> {
    let username = payload.username.trim().to_string();
    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    let valid = {
        let pool = state.pool.clone();
        let username = username.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApiError::InternalServerError(e.to_string()))?;
            crosstalk_identity::verify_credentials(&conn, &username, &payload.password)
                .map_err(|e| ApiError::InternalServerError(e.to_string()))
        })
        .await
        .map_err(|e| ApiError::InternalServerError(e.to_string()))??
    };

    if !valid {
        return Err(ApiError::Unauthorized(
            "invalid username or password".to_string(),
        ));
    }

    Ok(Json(CredentialsResponse {
        message: "logged in".to_string(),
        username,
    }))
}
