use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::context::{RequestContext, SecurityContext};

/// The caller's `SecurityContext`, as resolved by the gateway middleware.
///
/// Never rejects: a request that carried no identity, or a route the
/// middleware does not cover, sees an anonymous context. Use the `require_*`
/// guards to turn that into 401/403.
#[derive(Debug, Clone)]
pub struct CurrentContext(pub Arc<SecurityContext>);

impl<S> FromRequestParts<S> for CurrentContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<Arc<SecurityContext>>()
            .cloned()
            .or_else(RequestContext::get)
            .unwrap_or_else(|| Arc::new(SecurityContext::anonymous()));

        Ok(Self(ctx))
    }
}

impl CurrentContext {
    /// The decrypted user id, or 401 for anonymous callers.
    pub fn require_identity(&self) -> Result<&str, AppError> {
        self.0.user_id.as_deref().ok_or(AppError::Unauthorized)
    }

    pub fn require_auth(&self, authority: &str) -> Result<(), AppError> {
        if self.0.has_auth(authority) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn require_any_auth(&self, authorities: &[&str]) -> Result<(), AppError> {
        if self.0.has_any_auth(authorities) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

impl std::ops::Deref for CurrentContext {
    type Target = SecurityContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
