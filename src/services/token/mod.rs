pub mod claims;
pub mod jwt;
pub mod service;

use thiserror::Error;

use crate::services::identity_cipher::CipherError;

pub use claims::{TokenClaims, TokenType, normalize_authorities};
pub use service::{AccessTokenRequest, TokenService, TokenSettings};

/// Token failures. Callers that answer HTTP requests should collapse the
/// invalid-token kinds into one generic rejection and log the detail.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token malformed: {0}")]
    Malformed(String),
    #[error("token signature invalid")]
    SignatureInvalid,
    #[error("expected a {expected:?} token")]
    WrongType { expected: TokenType },

    #[error("token secret is not configured")]
    MissingSecret,
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error(transparent)]
    Identity(#[from] CipherError),
}

impl TokenError {
    /// The presented token cannot be trusted (as opposed to an issuing failure).
    pub fn is_invalid_token(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::Malformed(_) | Self::SignatureInvalid | Self::WrongType { .. }
        )
    }
}
