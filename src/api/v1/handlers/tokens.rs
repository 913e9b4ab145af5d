/*
 * Responsibility
 * - POST /api/v1/tokens: issue an access (+ refresh) token for the gateway identity
 * - POST /api/v1/tokens/refresh: trade a refresh token for a new access token
 * - Every token failure reaches the client as the same INVALID_TOKEN rejection
 */
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;

use crate::api::v1::dto::tokens::{RefreshRequest, TokenResponse};
use crate::api::v1::extractors::CurrentContext;
use crate::error::{ApiRejection, AppError, RequestMeta};
use crate::services::token::AccessTokenRequest;
use crate::state::AppState;

pub async fn issue(
    State(state): State<AppState>,
    meta: RequestMeta,
    ctx: CurrentContext,
) -> Result<(StatusCode, Json<TokenResponse>), ApiRejection> {
    let identity = ctx.require_identity().map_err(|e| meta.reject(e))?;

    let req = AccessTokenRequest {
        user_no: ctx.user_no,
        service_id: ctx.service_id.clone(),
        role: ctx.role.clone(),
        provider: ctx.provider.clone(),
        nickname: ctx.nickname.clone(),
        client_ip: ctx.client_ip.clone(),
        device_code: ctx.device_code.clone(),
        device_detail: ctx.device_detail.clone(),
        ..AccessTokenRequest::new(identity)
    }
    .with_authorities(ctx.authorities.iter().cloned());

    let pair = state
        .tokens
        .issue_token_pair(req)
        .map_err(|e| meta.reject(AppError::from(e)))?;

    tracing::info!(user_no = ?ctx.user_no, "issued token pair");
    Ok((StatusCode::CREATED, Json(pair.into())))
}

pub async fn refresh(
    State(state): State<AppState>,
    meta: RequestMeta,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiRejection> {
    let Json(body) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "refresh body rejected");
        meta.reject(AppError::BadRequest(rejection.body_text()))
    })?;

    let access_token = state
        .tokens
        .reissue_access_token(&body.refresh_token)
        .map_err(|e| meta.reject(AppError::from(e)))?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.tokens.access_token_ttl_seconds(),
        refresh_token: None,
    }))
}
