use std::collections::BTreeSet;

use serde::Serialize;

/// Identity the gateway vouched for, resolved once per request.
///
/// - `user_id` is the decrypted identity; `None` means the request is anonymous.
/// - `authorities` are coarse-grained codes; checks are plain set membership.
/// - `access_token` is the caller's bearer token, kept only so it can be
///   forwarded downstream. It is never serialized.
#[derive(Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    pub user_no: Option<i64>,
    pub user_id: Option<String>,
    pub service_id: Option<String>,
    pub role: Option<String>,
    pub authorities: BTreeSet<String>,
    pub provider: Option<String>,
    pub nickname: Option<String>,
    pub client_ip: Option<String>,
    pub device_code: Option<String>,
    pub device_detail: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
}

impl SecurityContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    pub fn has_auth(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    pub fn has_any_auth(&self, authorities: &[&str]) -> bool {
        authorities.iter().any(|a| self.authorities.contains(*a))
    }

    /// Vacuously true for an empty list.
    pub fn has_all_auth(&self, authorities: &[&str]) -> bool {
        authorities.iter().all(|a| self.authorities.contains(*a))
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("user_no", &self.user_no)
            .field("user_id", &self.user_id)
            .field("service_id", &self.service_id)
            .field("role", &self.role)
            .field("authorities", &self.authorities)
            .field("provider", &self.provider)
            .field("client_ip", &self.client_ip)
            .field("device_code", &self.device_code)
            .field("has_access_token", &self.access_token.is_some())
            .finish_non_exhaustive()
    }
}
