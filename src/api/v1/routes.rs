/*
 * Responsibility
 * - URL layout of /api/v1
 * - Every v1 route sits behind the gateway check
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::v1::handlers::{admin, me, tokens};
use crate::middleware::gateway;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let router = Router::new()
        .route("/me", get(me::me))
        .route("/tokens", post(tokens::issue))
        .route("/tokens/refresh", post(tokens::refresh))
        .route("/admin/ping", get(admin::ping));

    gateway::apply(router, state)
}
