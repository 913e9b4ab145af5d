/*
 * Responsibility
 * - GET /api/v1/me: echo the identity the gateway vouched for
 * - Anonymous callers get an anonymous body, not an error
 */
use axum::Json;
use serde::Serialize;

use crate::api::v1::extractors::CurrentContext;
use crate::services::context::SecurityContext;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub anonymous: bool,
    #[serde(flatten)]
    pub context: SecurityContext,
}

pub async fn me(ctx: CurrentContext) -> Json<MeResponse> {
    Json(MeResponse {
        anonymous: ctx.is_anonymous(),
        context: ctx.0.as_ref().clone(),
    })
}
