/*
 * Responsibility
 * - HTTP-facing error kinds (AppError)
 * - Rejection body {requestId, code, message, path, timestamp}
 * - Service errors are mapped here; their detail stays in the logs
 */
use axum::{
    Json,
    extract::{FromRequestParts, OriginalUri},
    http::{HeaderMap, StatusCode, Uri, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::services::headers;
use crate::services::token::TokenError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    Unauthorized,
    #[error("invalid token")]
    InvalidToken,
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("internal server error")]
    Internal,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        if e.is_invalid_token() {
            tracing::warn!(error = %e, "token rejected");
            AppError::InvalidToken
        } else {
            tracing::error!(error = %e, "token operation failed");
            AppError::Internal
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub request_id: String,
    pub code: &'static str,
    pub message: String,
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

/// An `AppError` bound to the request it answers.
#[derive(Debug)]
pub struct ApiRejection {
    pub error: AppError,
    pub path: String,
    pub request_id: String,
}

impl IntoResponse for ApiRejection {
    fn into_response(self) -> Response {
        let (status, code) = self.error.status_and_code();

        let body = ErrorResponse {
            request_id: self.request_id,
            code,
            message: self.error.to_string(),
            path: self.path,
            timestamp: Utc::now(),
        };

        (status, Json(body)).into_response()
    }
}

/// Request id and path, for handlers that need to build a rejection.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub path: String,
    pub request_id: String,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap, uri: &Uri) -> Self {
        let request_id = headers
            .get(headers::REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            path: uri.path().to_string(),
            request_id,
        }
    }

    pub fn reject(&self, error: AppError) -> ApiRejection {
        ApiRejection {
            error,
            path: self.path.clone(),
            request_id: self.request_id.clone(),
        }
    }
}

impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Nested routers see a stripped uri; report the one the client sent.
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|OriginalUri(uri)| uri.clone())
            .unwrap_or_else(|| parts.uri.clone());

        Ok(Self::from_headers(&parts.headers, &uri))
    }
}
