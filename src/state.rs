/*
 * Responsibility
 * - Shared context attached to the Router (AppState)
 * - Cheap to clone: every service sits behind an Arc
 */
use std::sync::Arc;

use crate::config::Config;
use crate::services::clock::SharedClock;
use crate::services::identity_cipher::{CipherError, IdentityCipher};
use crate::services::signature::{SignatureError, SignatureValidator};
use crate::services::token::{TokenError, TokenService};

#[derive(Clone, Debug)]
pub struct AppState {
    pub signatures: Arc<SignatureValidator>,
    pub cipher: Arc<IdentityCipher>,
    pub tokens: Arc<TokenService>,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl AppState {
    /// Build the request-path services from validated config.
    pub fn from_config(config: &Config, clock: SharedClock) -> Result<Self, StateError> {
        let signatures = Arc::new(SignatureValidator::new(
            &config.gateway_secret,
            config.signature,
            clock.clone(),
        )?);
        let cipher = Arc::new(IdentityCipher::new(&config.identity_key, &config.identity_iv)?);
        let tokens = Arc::new(TokenService::new(
            &config.token_secret,
            config.token.clone(),
            cipher.clone(),
            clock,
        )?);

        Ok(Self {
            signatures,
            cipher,
            tokens,
        })
    }
}
