//! Transport-level layers shared by every route, `/health` included.
//!
//! - `x-request-id`: generated when the caller sent none, echoed on the response.
//!   The gateway check runs inside this layer, so its rejections carry the same id.
//! - Access log via `TraceLayer`
//! - Request body cap and a global timeout
use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::services::headers;

#[derive(Debug, Clone, Copy)]
pub struct HttpPolicy {
    pub body_limit_bytes: usize,
    pub timeout: Duration,
}

impl Default for HttpPolicy {
    fn default() -> Self {
        Self {
            body_limit_bytes: 1024 * 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

pub fn apply(router: Router, policy: HttpPolicy) -> Router {
    let layers = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(|err: BoxError| async move {
            if err.is::<tower::timeout::error::Elapsed>() {
                StatusCode::REQUEST_TIMEOUT
            } else {
                tracing::error!(error = %err, "unhandled middleware error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }))
        .layer(SetRequestIdLayer::new(headers::REQUEST_ID, MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(headers::REQUEST_ID))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(policy.body_limit_bytes))
        .layer(TimeoutLayer::new(policy.timeout));

    router.layer(layers)
}
