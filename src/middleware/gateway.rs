//! Gateway trust boundary for `/api/v1/*`.
//!
//! Per request:
//! 1. Verify `X-Gateway-Signature` over method + path/query + timestamp (401 on failure)
//! 2. Resolve the identity headers into a `SecurityContext`
//!    (no `X-User-Id` => anonymous; undecryptable => 401)
//! 3. Put the context in request extensions and in the task-scoped
//!    `RequestContext`, then run the handler
//! 4. The context is cleared when the scope ends, whatever the handler did
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{OriginalUri, State},
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::Response,
};
use tracing::{Instrument, debug, error, info_span, warn};
use url::form_urlencoded;

use crate::error::{ApiRejection, AppError, RequestMeta};
use crate::services::context::{RequestContext, SecurityContext};
use crate::services::headers;
use crate::services::identity_cipher::IdentityCipher;
use crate::services::token::normalize_authorities;
use crate::state::AppState;

/// Put the gateway check in front of every route in `router`.
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.layer(middleware::from_fn_with_state(state, gateway_middleware))
}

async fn gateway_middleware(
    State(state): State<AppState>,
    OriginalUri(original): OriginalUri,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiRejection> {
    let meta = RequestMeta::from_headers(req.headers(), &original);

    // The gateway signs what the client asked for, before any nesting strips it.
    let signed_uri = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| original.path());

    if let Err(err) = state.signatures.verify(
        req.method().as_str(),
        signed_uri,
        header_str(req.headers(), &headers::GATEWAY_TIMESTAMP),
        header_str(req.headers(), &headers::GATEWAY_SIGNATURE),
    ) {
        warn!(
            error = %err,
            method = %req.method(),
            uri = signed_uri,
            request_id = %meta.request_id,
            "gateway signature rejected"
        );
        return Err(meta.reject(AppError::Unauthorized));
    }

    let ctx = match resolve_context(req.headers(), &state.cipher) {
        Ok(ctx) => Arc::new(ctx),
        Err(reason) => {
            warn!(reason, request_id = %meta.request_id, "identity headers rejected");
            return Err(meta.reject(AppError::Unauthorized));
        }
    };

    debug!(
        user_no = ?ctx.user_no,
        anonymous = ctx.is_anonymous(),
        authorities = ?ctx.authorities,
        "security context resolved"
    );
    req.extensions_mut().insert(ctx.clone());

    let span = info_span!("gateway", request_id = %meta.request_id, user_no = ?ctx.user_no);
    RequestContext::scope(
        async move {
            let _guard = match RequestContext::set(ctx) {
                Ok(guard) => guard,
                Err(err) => {
                    error!(error = %err, "security context could not be installed");
                    return Err(meta.reject(AppError::Internal));
                }
            };
            Ok(next.run(req).await)
        }
        .instrument(span),
    )
    .await
}

/// Build the context the gateway vouched for.
///
/// Only `X-Auth` is lenient: anything that is not a JSON array reads as
/// "no authorities". Every other malformed identity header rejects.
pub fn resolve_context(
    headers: &HeaderMap,
    cipher: &IdentityCipher,
) -> Result<SecurityContext, &'static str> {
    let Some(envelope) = optional(headers, &headers::USER_ID)? else {
        return Ok(SecurityContext::anonymous());
    };

    let user_id = cipher
        .decrypt_identity(&envelope)
        .map_err(|_| "X-User-Id could not be decrypted")?;

    let user_no = optional(headers, &headers::USER_NO)?
        .map(|raw| raw.parse::<i64>())
        .transpose()
        .map_err(|_| "X-User-No is not a number")?;

    let authorities = optional(headers, &headers::AUTHORITIES)?
        .map(|raw| parse_authorities(&raw))
        .unwrap_or_default();

    let nickname = optional(headers, &headers::NICKNAME)?.map(|raw| decode_nickname(&raw));

    let access_token = header_str(headers, &header::AUTHORIZATION)
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    Ok(SecurityContext {
        user_no,
        user_id: Some(user_id),
        service_id: optional(headers, &headers::SERVICE_ID)?,
        role: optional(headers, &headers::ROLE)?,
        authorities: authorities.into_iter().collect(),
        provider: optional(headers, &headers::PROVIDER)?,
        nickname,
        client_ip: optional(headers, &headers::CLIENT_IP)?,
        device_code: optional(headers, &headers::DEVICE_CODE)?,
        device_detail: optional(headers, &headers::DEVICE_DETAIL)?,
        access_token,
    })
}

fn parse_authorities(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(values) => normalize_authorities(values),
        Err(err) => {
            warn!(error = %err, "X-Auth is not a JSON array; continuing without authorities");
            Vec::new()
        }
    }
}

fn decode_nickname(raw: &str) -> String {
    // Decode as a single form key; `&` and `=` are data here, not separators.
    let escaped = raw.replace('&', "%26").replace('=', "%3D");
    form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// Absent or blank => None; present but not visible ASCII => reject.
fn optional(headers: &HeaderMap, name: &header::HeaderName) -> Result<Option<String>, &'static str> {
    match headers.get(name) {
        None => Ok(None),
        Some(v) => {
            let s = v.to_str().map_err(|_| "identity header is not valid ASCII")?;
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
    }
}
