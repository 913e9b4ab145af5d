//! Gateway request signatures.
//!
//! The gateway signs `METHOD:PATH_AND_QUERY:TIMESTAMP_MILLIS` with a shared
//! secret (HMAC-SHA256, standard base64). A request is genuine only when the
//! exact string can be rebuilt on this side and the timestamp is inside the
//! skew window. Services calling each other sign the same way, always over the
//! request they are about to send.
use axum::http::{HeaderMap, HeaderValue, Method};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::services::clock::SharedClock;
use crate::services::headers;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_SKEW_MILLIS: i64 = 300_000;

/// Placeholder signature for running a service without a gateway in front of it.
/// Only honoured when `SignaturePolicy::mock_enabled` is set.
pub const MOCK_SIGNATURE: &str = "mock-gateway-signature";

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("gateway secret is not configured")]
    MissingSecret,
    #[error("missing gateway signature")]
    MissingSignature,
    #[error("missing gateway timestamp")]
    MissingTimestamp,
    #[error("gateway timestamp is not epoch milliseconds")]
    InvalidTimestamp,
    #[error("gateway timestamp outside skew window ({skew_millis} ms)")]
    Stale { skew_millis: i64 },
    #[error("gateway signature mismatch")]
    Mismatch,
    #[error("signature header value could not be encoded")]
    HeaderEncoding,
}

#[derive(Debug, Clone, Copy)]
pub struct SignaturePolicy {
    // Allowed |now - timestamp|, milliseconds.
    pub skew_millis: i64,
    pub mock_enabled: bool,
}

impl Default for SignaturePolicy {
    fn default() -> Self {
        Self {
            skew_millis: DEFAULT_SKEW_MILLIS,
            mock_enabled: false,
        }
    }
}

#[derive(Clone)]
pub struct SignatureValidator {
    // Keyed once; cloned per message.
    keyed: HmacSha256,
    policy: SignaturePolicy,
    clock: SharedClock,
}

impl std::fmt::Debug for SignatureValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureValidator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SignatureValidator {
    pub fn new(
        secret: &str,
        policy: SignaturePolicy,
        clock: SharedClock,
    ) -> Result<Self, SignatureError> {
        if secret.is_empty() {
            return Err(SignatureError::MissingSecret);
        }
        let keyed = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::MissingSecret)?;
        Ok(Self {
            keyed,
            policy,
            clock,
        })
    }

    pub fn policy(&self) -> SignaturePolicy {
        self.policy
    }

    /// Boolean form of [`verify`](Self::verify). Callers that only gate a
    /// request should use this; the reason is for server-side logs.
    pub fn validate(
        &self,
        method: &str,
        uri: &str,
        timestamp: Option<&str>,
        signature: Option<&str>,
    ) -> bool {
        self.verify(method, uri, timestamp, signature).is_ok()
    }

    pub fn verify(
        &self,
        method: &str,
        uri: &str,
        timestamp: Option<&str>,
        signature: Option<&str>,
    ) -> Result<(), SignatureError> {
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::MissingSignature)?;

        if self.policy.mock_enabled && signature == MOCK_SIGNATURE {
            debug!(method, uri, "accepting mock gateway signature");
            return Ok(());
        }

        let timestamp = timestamp
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::MissingTimestamp)?;
        let sent_at: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;

        let drift = self.clock.now_millis().abs_diff(sent_at);
        if drift > self.policy.skew_millis.unsigned_abs() {
            return Err(SignatureError::Stale {
                skew_millis: self.policy.skew_millis,
            });
        }

        let provided = STANDARD
            .decode(signature.trim())
            .map_err(|_| SignatureError::Mismatch)?;
        let expected = self.mac(method, uri, timestamp);

        if bool::from(provided.ct_eq(expected.as_slice())) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// base64(HMAC-SHA256(`method:uri:timestamp`)).
    pub fn generate_signature(&self, method: &str, uri: &str, timestamp: &str) -> String {
        STANDARD.encode(self.mac(method, uri, timestamp))
    }

    /// Fresh signature headers for an outbound call to `url`.
    pub fn sign_outbound(&self, method: &Method, url: &Url) -> Result<HeaderMap, SignatureError> {
        let timestamp = self.clock.now_millis().to_string();
        let signature =
            self.generate_signature(method.as_str(), &path_and_query(url), &timestamp);

        let mut out = HeaderMap::new();
        out.insert(
            headers::GATEWAY_SIGNATURE,
            HeaderValue::from_str(&signature).map_err(|_| SignatureError::HeaderEncoding)?,
        );
        out.insert(
            headers::GATEWAY_TIMESTAMP,
            HeaderValue::from_str(&timestamp).map_err(|_| SignatureError::HeaderEncoding)?,
        );
        Ok(out)
    }

    fn mac(&self, method: &str, uri: &str, timestamp: &str) -> Vec<u8> {
        let mut mac = self.keyed.clone();
        mac.update(method.as_bytes());
        mac.update(b":");
        mac.update(uri.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// The part of `url` the gateway signs: path plus `?query` when present.
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::services::clock::ManualClock;

    const NOW: i64 = 1_700_000_000_000;

    fn validator_at(clock: &ManualClock, policy: SignaturePolicy) -> SignatureValidator {
        SignatureValidator::new("s3cr3t", policy, Arc::new(clock.clone())).unwrap()
    }

    fn reference_signature(secret: &str, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn known_tuple_matches_reference_hmac() {
        let clock = ManualClock::at_millis(NOW);
        let v = validator_at(&clock, SignaturePolicy::default());

        let sig = v.generate_signature("GET", "/api/user/me", "1700000000000");
        assert_eq!(
            sig,
            reference_signature("s3cr3t", "GET:/api/user/me:1700000000000")
        );
        assert!(v.validate("GET", "/api/user/me", Some("1700000000000"), Some(&sig)));
    }

    #[test]
    fn timestamp_beyond_skew_is_rejected() {
        let clock = ManualClock::at_millis(NOW);
        let v = validator_at(&clock, SignaturePolicy::default());

        let late = (NOW + 301_000).to_string();
        let sig = v.generate_signature("GET", "/api/user/me", &late);
        assert!(matches!(
            v.verify("GET", "/api/user/me", Some(&late), Some(&sig)),
            Err(SignatureError::Stale { .. })
        ));

        let early = (NOW - 301_000).to_string();
        let sig = v.generate_signature("GET", "/api/user/me", &early);
        assert!(!v.validate("GET", "/api/user/me", Some(&early), Some(&sig)));

        let edge = (NOW + 300_000).to_string();
        let sig = v.generate_signature("GET", "/api/user/me", &edge);
        assert!(v.validate("GET", "/api/user/me", Some(&edge), Some(&sig)));
    }

    #[test]
    fn any_single_bit_flip_is_rejected() {
        let clock = ManualClock::at_millis(NOW);
        let v = validator_at(&clock, SignaturePolicy::default());
        let ts = NOW.to_string();
        let raw = STANDARD
            .decode(v.generate_signature("POST", "/orders?page=2", &ts))
            .unwrap();

        for byte in 0..raw.len() {
            for bit in 0..8 {
                let mut flipped = raw.clone();
                flipped[byte] ^= 1 << bit;
                let sig = STANDARD.encode(&flipped);
                assert!(!v.validate("POST", "/orders?page=2", Some(&ts), Some(&sig)));
            }
        }
    }

    #[test]
    fn rebuilt_message_must_match_exactly() {
        let clock = ManualClock::at_millis(NOW);
        let v = validator_at(&clock, SignaturePolicy::default());
        let ts = NOW.to_string();
        let sig = v.generate_signature("GET", "/api/user/me?x=1", &ts);

        assert!(!v.validate("GET", "/api/user/me", Some(&ts), Some(&sig)));
        assert!(!v.validate("get", "/api/user/me?x=1", Some(&ts), Some(&sig)));
        assert!(!v.validate("GET", "/api/user/me?x=1", Some(&(NOW + 1).to_string()), Some(&sig)));
    }

    #[test]
    fn missing_or_garbled_headers_are_rejected() {
        let clock = ManualClock::at_millis(NOW);
        let v = validator_at(&clock, SignaturePolicy::default());
        let ts = NOW.to_string();
        let sig = v.generate_signature("GET", "/", &ts);

        assert!(matches!(
            v.verify("GET", "/", Some(&ts), None),
            Err(SignatureError::MissingSignature)
        ));
        assert!(matches!(
            v.verify("GET", "/", None, Some(&sig)),
            Err(SignatureError::MissingTimestamp)
        ));
        assert!(matches!(
            v.verify("GET", "/", Some("yesterday"), Some(&sig)),
            Err(SignatureError::InvalidTimestamp)
        ));
        assert!(matches!(
            v.verify("GET", "/", Some(&ts), Some("not base64!")),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn mock_signature_requires_mock_mode() {
        let clock = ManualClock::at_millis(NOW);

        let strict = validator_at(&clock, SignaturePolicy::default());
        assert!(!strict.validate("GET", "/", None, Some(MOCK_SIGNATURE)));

        let local = validator_at(
            &clock,
            SignaturePolicy {
                mock_enabled: true,
                ..SignaturePolicy::default()
            },
        );
        assert!(local.validate("GET", "/", None, Some(MOCK_SIGNATURE)));
    }

    #[test]
    fn empty_secret_is_a_configuration_error() {
        let clock = ManualClock::at_millis(NOW);
        assert!(matches!(
            SignatureValidator::new("", SignaturePolicy::default(), Arc::new(clock)),
            Err(SignatureError::MissingSecret)
        ));
    }

    #[test]
    fn outbound_headers_sign_the_target_path_and_query() {
        let clock = ManualClock::at_millis(NOW);
        let v = validator_at(&clock, SignaturePolicy::default());
        let url = Url::parse("http://orders.internal:8080/api/orders?status=open&page=3").unwrap();

        let out = v.sign_outbound(&Method::GET, &url).unwrap();
        let ts = out[headers::GATEWAY_TIMESTAMP].to_str().unwrap();
        let sig = out[headers::GATEWAY_SIGNATURE].to_str().unwrap();

        assert_eq!(ts, NOW.to_string());
        assert!(v.validate("GET", "/api/orders?status=open&page=3", Some(ts), Some(sig)));
    }
}
