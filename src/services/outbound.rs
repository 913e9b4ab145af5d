//! Headers for service-to-service calls.
//!
//! Every outbound request gets its own signature over the URL actually being
//! called. Identity travels the same way it arrived: the user id re-sealed with
//! the shared cipher, the rest as plain headers, the bearer token verbatim.
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, header};
use thiserror::Error;
use url::{Url, form_urlencoded};

use crate::services::context::{RequestContext, SecurityContext};
use crate::services::headers;
use crate::services::identity_cipher::{CipherError, IdentityCipher};
use crate::services::signature::{SignatureError, SignatureValidator};

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Identity(#[from] CipherError),
    #[error("value for {0} cannot be sent as a header")]
    HeaderEncoding(HeaderName),
}

#[derive(Clone, Debug)]
pub struct OutboundSigner {
    signatures: Arc<SignatureValidator>,
    cipher: Arc<IdentityCipher>,
}

impl OutboundSigner {
    pub fn new(signatures: Arc<SignatureValidator>, cipher: Arc<IdentityCipher>) -> Self {
        Self { signatures, cipher }
    }

    /// Signature headers plus whatever the current request's context carries.
    pub fn headers(&self, method: &Method, url: &Url) -> Result<HeaderMap, OutboundError> {
        let mut out = self.signatures.sign_outbound(method, url)?;
        if let Some(ctx) = RequestContext::get() {
            self.propagate(&ctx, &mut out)?;
        }
        Ok(out)
    }

    /// Copy `ctx` onto `out`. Anonymous contexts only forward the bearer token.
    pub fn propagate(&self, ctx: &SecurityContext, out: &mut HeaderMap) -> Result<(), OutboundError> {
        if let Some(token) = &ctx.access_token {
            put(out, header::AUTHORIZATION, &format!("Bearer {}", token))?;
        }

        let Some(user_id) = &ctx.user_id else {
            return Ok(());
        };
        put(out, headers::USER_ID, &self.cipher.encrypt_identity(user_id)?)?;

        if let Some(no) = ctx.user_no {
            put(out, headers::USER_NO, &no.to_string())?;
        }
        if !ctx.authorities.is_empty() {
            let json = serde_json::to_string(&ctx.authorities)
                .map_err(|_| OutboundError::HeaderEncoding(headers::AUTHORITIES))?;
            put(out, headers::AUTHORITIES, &json)?;
        }
        if let Some(nickname) = &ctx.nickname {
            let encoded: String = form_urlencoded::byte_serialize(nickname.as_bytes()).collect();
            put(out, headers::NICKNAME, &encoded)?;
        }

        let plain = [
            (headers::SERVICE_ID, &ctx.service_id),
            (headers::ROLE, &ctx.role),
            (headers::PROVIDER, &ctx.provider),
            (headers::CLIENT_IP, &ctx.client_ip),
            (headers::DEVICE_CODE, &ctx.device_code),
            (headers::DEVICE_DETAIL, &ctx.device_detail),
        ];
        for (name, value) in plain {
            if let Some(value) = value {
                put(out, name, value)?;
            }
        }

        Ok(())
    }
}

fn put(out: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), OutboundError> {
    let value =
        HeaderValue::from_str(value).map_err(|_| OutboundError::HeaderEncoding(name.clone()))?;
    out.insert(name, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::services::signature::SignaturePolicy;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";
    const IV: &[u8] = b"abcdef9876543210";

    fn signer() -> (OutboundSigner, Arc<SignatureValidator>, Arc<IdentityCipher>) {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let signatures = Arc::new(
            SignatureValidator::new("s3cr3t", SignaturePolicy::default(), clock).unwrap(),
        );
        let cipher = Arc::new(IdentityCipher::new(KEY, IV).unwrap());
        (
            OutboundSigner::new(signatures.clone(), cipher.clone()),
            signatures,
            cipher,
        )
    }

    fn value<'a>(map: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
        map.get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn outside_a_request_only_signs() {
        let (outbound, signatures, _) = signer();
        let url = Url::parse("http://orders.internal/api/orders?page=2").unwrap();

        let out = outbound.headers(&Method::GET, &url).unwrap();

        assert_eq!(out.len(), 2);
        assert!(signatures.validate(
            "GET",
            "/api/orders?page=2",
            value(&out, &headers::GATEWAY_TIMESTAMP),
            value(&out, &headers::GATEWAY_SIGNATURE),
        ));
    }

    #[test]
    fn context_is_forwarded_with_identity_resealed() {
        let (outbound, _, cipher) = signer();
        let url = Url::parse("http://orders.internal/api/orders").unwrap();
        let ctx = SecurityContext {
            user_id: Some("user@example.com".into()),
            user_no: Some(42),
            role: Some("MEMBER".into()),
            nickname: Some("홍길동 a".into()),
            authorities: ["ADMIN", "USER"].into_iter().map(String::from).collect(),
            access_token: Some("opaque.token.value".into()),
            ..SecurityContext::default()
        };

        let out = RequestContext::sync_scope(|| {
            let _guard = RequestContext::set(ctx).unwrap();
            outbound.headers(&Method::POST, &url).unwrap()
        });

        assert_eq!(
            value(&out, &header::AUTHORIZATION),
            Some("Bearer opaque.token.value")
        );
        let sealed = value(&out, &headers::USER_ID).unwrap();
        assert_eq!(cipher.decrypt_identity(sealed).unwrap(), "user@example.com");
        assert_eq!(value(&out, &headers::USER_NO), Some("42"));
        assert_eq!(value(&out, &headers::ROLE), Some("MEMBER"));
        assert_eq!(value(&out, &headers::AUTHORITIES), Some(r#"["ADMIN","USER"]"#));

        let nickname = value(&out, &headers::NICKNAME).unwrap();
        let decoded: Vec<_> = form_urlencoded::parse(nickname.as_bytes()).collect();
        assert_eq!(decoded[0].0, "홍길동 a");
        assert!(out.get(headers::PROVIDER).is_none());
    }
}
