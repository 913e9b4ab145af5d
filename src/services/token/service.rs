use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::services::clock::SharedClock;
use crate::services::identity_cipher::IdentityCipher;
use crate::services::token::TokenError;
use crate::services::token::claims::{
    ALL_APIS, REGISTERED_CLAIMS, TokenClaims, TokenType, normalize_authorities,
};
use crate::services::token::jwt::JwtCodec;

pub const DEFAULT_ACCESS_TTL_SECONDS: u64 = 60 * 60;
pub const DEFAULT_REFRESH_TTL_SECONDS: u64 = 24 * 60 * 60;
/// Longest lifetime any token may be issued with (ten years).
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub issuer: String,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
}

impl TokenSettings {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
        }
    }
}

/// Everything an access token can say about its holder.
///
/// `identity` is plaintext here; it is encrypted before it becomes `sub`.
/// `authorities` takes raw JSON values so numeric and string codes can be
/// mixed by the caller; they are normalized to strings on issue.
#[derive(Debug, Clone, Default)]
pub struct AccessTokenRequest {
    pub identity: String,
    pub user_no: Option<i64>,
    pub service_id: Option<String>,
    pub role: Option<String>,
    pub authorities: Vec<Value>,
    pub accessible_apis: Vec<String>,
    pub provider: Option<String>,
    pub nickname: Option<String>,
    pub client_ip: Option<String>,
    pub device_code: Option<String>,
    pub device_detail: Option<String>,
    pub extra: Map<String, Value>,
    // Overrides the configured access TTL.
    pub ttl_seconds: Option<u64>,
}

impl AccessTokenRequest {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Self::default()
        }
    }

    pub fn with_authorities<I, A>(mut self, authorities: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Value>,
    {
        self.authorities = authorities.into_iter().map(Into::into).collect();
        self
    }
}

/// Service-level return type to keep handlers thin.
#[derive(Clone, Debug)]
pub struct IssuedTokenPair {
    pub access_token: String,
    // Only issued when the holder has a user number.
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// Issues and reads HS256 tokens that carry a gateway identity.
#[derive(Clone, Debug)]
pub struct TokenService {
    jwt: JwtCodec,
    cipher: Arc<IdentityCipher>,
    settings: TokenSettings,
    clock: SharedClock,
}

impl TokenService {
    pub fn new(
        secret: &str,
        settings: TokenSettings,
        cipher: Arc<IdentityCipher>,
        clock: SharedClock,
    ) -> Result<Self, TokenError> {
        let jwt = JwtCodec::new(secret, &settings.issuer)?;
        Ok(Self {
            jwt,
            cipher,
            settings,
            clock,
        })
    }

    pub fn access_token_ttl_seconds(&self) -> u64 {
        self.settings.access_ttl_seconds
    }

    pub fn issue_access_token(&self, req: AccessTokenRequest) -> Result<String, TokenError> {
        let subject = self.cipher.encrypt_identity(&req.identity)?;

        let mut accessible_apis: Vec<String> = req
            .accessible_apis
            .into_iter()
            .map(|api| api.trim().to_string())
            .filter(|api| !api.is_empty())
            .collect();
        if accessible_apis.is_empty() {
            accessible_apis.push(ALL_APIS.to_string());
        }

        let now = self.clock.now_seconds();
        let ttl = req.ttl_seconds.unwrap_or(self.settings.access_ttl_seconds);

        let claims = TokenClaims {
            sub: Some(subject),
            iss: Some(self.settings.issuer.clone()),
            iat: Some(now),
            exp: expires_at(now, ttl)?,
            token_type: Some(TokenType::Access),
            user_no: req.user_no,
            service_id: req.service_id,
            role: req.role,
            authorities: normalize_authorities(req.authorities),
            accessible_apis,
            provider: req.provider,
            nickname: req.nickname,
            client_ip: req.client_ip,
            device_code: req.device_code,
            device_detail: req.device_detail,
            identity: None,
            extra: extension_claims(req.extra),
        };

        debug!(
            user_no = ?claims.user_no,
            ttl_seconds = ttl,
            "issuing access token"
        );
        self.jwt.sign(&claims)
    }

    /// Refresh tokens name the user by number; the identity envelope is optional.
    pub fn issue_refresh_token(
        &self,
        user_no: i64,
        identity: Option<&str>,
        ttl_seconds: Option<u64>,
    ) -> Result<String, TokenError> {
        let identity = match identity.filter(|i| !i.trim().is_empty()) {
            Some(plain) => Some(self.cipher.encrypt_identity(plain)?),
            None => None,
        };

        let now = self.clock.now_seconds();
        let ttl = ttl_seconds.unwrap_or(self.settings.refresh_ttl_seconds);

        let claims = TokenClaims {
            sub: Some(user_no.to_string()),
            iss: Some(self.settings.issuer.clone()),
            iat: Some(now),
            exp: expires_at(now, ttl)?,
            token_type: Some(TokenType::Refresh),
            user_no: Some(user_no),
            service_id: None,
            role: None,
            authorities: Vec::new(),
            accessible_apis: Vec::new(),
            provider: None,
            nickname: None,
            client_ip: None,
            device_code: None,
            device_detail: None,
            identity,
            extra: Map::new(),
        };

        debug!(user_no, ttl_seconds = ttl, "issuing refresh token");
        self.jwt.sign(&claims)
    }

    pub fn issue_token_pair(&self, req: AccessTokenRequest) -> Result<IssuedTokenPair, TokenError> {
        let user_no = req.user_no;
        let identity = req.identity.clone();
        let expires_in = req.ttl_seconds.unwrap_or(self.settings.access_ttl_seconds);

        let access_token = self.issue_access_token(req)?;
        let refresh_token = match user_no {
            Some(no) => Some(self.issue_refresh_token(no, Some(&identity), None)?),
            None => None,
        };

        Ok(IssuedTokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in,
        })
    }

    /// Mint a new access token from a valid refresh token.
    pub fn reissue_access_token(&self, refresh_token: &str) -> Result<String, TokenError> {
        let claims = self.validate_refresh(refresh_token)?;
        let identity = self
            .decrypt_subject(&claims)
            .ok_or_else(|| TokenError::Malformed("refresh token carries no identity".into()))?;

        let mut req = AccessTokenRequest::new(identity);
        req.user_no = claims.user_no;
        self.issue_access_token(req)
    }

    /// Verify signature, issuer and expiry.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims: TokenClaims = self.jwt.decode(token)?;
        if self.clock.now_seconds() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    pub fn validate_access(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.validate(token)?;
        if claims.is_refresh() {
            return Err(TokenError::WrongType {
                expected: TokenType::Access,
            });
        }
        Ok(claims)
    }

    pub fn validate_refresh(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.validate(token)?;
        if !claims.is_refresh() {
            return Err(TokenError::WrongType {
                expected: TokenType::Refresh,
            });
        }
        Ok(claims)
    }

    /// Fail-closed: anything that prevents reading the token counts as expired.
    pub fn is_expired(&self, token: &str) -> bool {
        match self.validate(token) {
            Ok(_) => false,
            Err(err) => {
                debug!(error = %err, "token treated as expired");
                true
            }
        }
    }

    /// Decrypted identity. Access tokens carry it in `sub`, refresh tokens in `uid`.
    pub fn extract_user_id(&self, token: &str) -> Result<Option<String>, TokenError> {
        let claims = self.validate(token)?;
        Ok(self.decrypt_subject(&claims))
    }

    pub fn extract_user_no(&self, token: &str) -> Result<Option<i64>, TokenError> {
        let claims = self.validate(token)?;
        let from_sub = || {
            claims
                .is_refresh()
                .then(|| claims.sub.as_deref().and_then(|s| s.parse().ok()))
                .flatten()
        };
        Ok(claims.user_no.or_else(from_sub))
    }

    pub fn extract_role(&self, token: &str) -> Result<Option<String>, TokenError> {
        Ok(self.validate(token)?.role)
    }

    pub fn extract_authorities(&self, token: &str) -> Result<Vec<String>, TokenError> {
        Ok(self.validate(token)?.authorities)
    }

    pub fn extract_accessible_apis(&self, token: &str) -> Result<Vec<String>, TokenError> {
        Ok(self.validate(token)?.accessible_apis)
    }

    pub fn extract_service_id(&self, token: &str) -> Result<Option<String>, TokenError> {
        Ok(self.validate(token)?.service_id)
    }

    pub fn extract_provider(&self, token: &str) -> Result<Option<String>, TokenError> {
        Ok(self.validate(token)?.provider)
    }

    pub fn extract_nickname(&self, token: &str) -> Result<Option<String>, TokenError> {
        Ok(self.validate(token)?.nickname)
    }

    pub fn extract_client_ip(&self, token: &str) -> Result<Option<String>, TokenError> {
        Ok(self.validate(token)?.client_ip)
    }

    pub fn extract_device_code(&self, token: &str) -> Result<Option<String>, TokenError> {
        Ok(self.validate(token)?.device_code)
    }

    pub fn extract_device_detail(&self, token: &str) -> Result<Option<String>, TokenError> {
        Ok(self.validate(token)?.device_detail)
    }

    pub fn extract_token_type(&self, token: &str) -> Result<Option<TokenType>, TokenError> {
        Ok(self.validate(token)?.token_type)
    }

    pub fn extract_issued_at(&self, token: &str) -> Result<Option<DateTime<Utc>>, TokenError> {
        let claims = self.validate(token)?;
        Ok(claims.iat.and_then(|iat| DateTime::from_timestamp(iat, 0)))
    }

    pub fn extract_expires_at(&self, token: &str) -> Result<Option<DateTime<Utc>>, TokenError> {
        let claims = self.validate(token)?;
        Ok(DateTime::from_timestamp(claims.exp, 0))
    }

    pub fn extract_claim(&self, token: &str, name: &str) -> Result<Option<Value>, TokenError> {
        Ok(self.validate(token)?.extra.remove(name))
    }

    fn decrypt_subject(&self, claims: &TokenClaims) -> Option<String> {
        let envelope = if claims.is_refresh() {
            claims.identity.as_deref()
        } else {
            claims.sub.as_deref()
        }?;

        match self.cipher.decrypt_identity(envelope) {
            Ok(identity) => Some(identity),
            Err(err) => {
                warn!(error = %err, "token subject could not be decrypted");
                None
            }
        }
    }
}

fn expires_at(now: i64, ttl_seconds: u64) -> Result<i64, TokenError> {
    if ttl_seconds == 0 || ttl_seconds > MAX_TTL_SECONDS {
        return Err(TokenError::Signing(format!(
            "ttl of {} seconds is outside 1..={}",
            ttl_seconds, MAX_TTL_SECONDS
        )));
    }
    i64::try_from(ttl_seconds)
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .ok_or_else(|| TokenError::Signing("token expiry overflows".into()))
}

fn extension_claims(extra: Map<String, Value>) -> Map<String, Value> {
    extra
        .into_iter()
        .filter(|(name, _)| {
            let reserved = REGISTERED_CLAIMS.contains(&name.as_str());
            if reserved {
                warn!(claim = %name, "dropping extension claim that shadows a registered claim");
            }
            !reserved
        })
        .collect()
}
