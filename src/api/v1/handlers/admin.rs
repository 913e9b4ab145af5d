use axum::Json;
use serde_json::{Value, json};

use crate::api::v1::extractors::CurrentContext;
use crate::error::{ApiRejection, RequestMeta};

pub const ADMIN: &str = "ADMIN";

/// GET /api/v1/admin/ping
pub async fn ping(meta: RequestMeta, ctx: CurrentContext) -> Result<Json<Value>, ApiRejection> {
    ctx.require_auth(ADMIN).map_err(|e| meta.reject(e))?;

    Ok(Json(json!({
        "pong": true,
        "userId": ctx.user_id.as_deref(),
    })))
}
