//! AES-256-CBC envelope for identity strings exchanged with the gateway.
//!
//! The IV is static configuration shared with the gateway, not generated per
//! message. Equal plaintexts therefore encrypt to equal ciphertexts. That leaks
//! equality of identities to anyone who can observe the gateway → service hop,
//! which is accepted for this closed channel. Do not reuse this cipher for data
//! that leaves it.
use aes::Aes256;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("identity key must be {KEY_LEN} bytes, got {actual}")]
    InvalidKeyLength { actual: usize },
    #[error("identity iv must be {IV_LEN} bytes, got {actual}")]
    InvalidIvLength { actual: usize },

    // Caller supplied nothing to work with.
    #[error("identity input is empty")]
    EmptyInput,
    // Ciphertext is not base64.
    #[error("identity ciphertext is not valid base64")]
    InvalidEncoding,
    // Key/IV mismatch, truncated block or bad padding.
    #[error("identity cipher operation failed")]
    Cipher,
    #[error("decrypted identity is not valid UTF-8")]
    InvalidUtf8,
}

impl CipherError {
    /// True when the input was rejected before the cipher ran.
    pub fn is_bad_input(&self) -> bool {
        matches!(self, Self::EmptyInput | Self::InvalidEncoding)
    }
}

#[derive(Clone)]
pub struct IdentityCipher {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl std::fmt::Debug for IdentityCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("IdentityCipher").finish_non_exhaustive()
    }
}

impl IdentityCipher {
    /// Build a cipher from raw key and IV bytes. Lengths are checked here so a
    /// misconfigured service fails at startup instead of on the first request.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| CipherError::InvalidKeyLength { actual: key.len() })?;
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| CipherError::InvalidIvLength { actual: iv.len() })?;

        Ok(Self { key, iv })
    }

    /// Lenient encrypt: empty in, empty out.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &self.iv)
            .map_err(|_| CipherError::Cipher)?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(STANDARD.encode(ciphertext))
    }

    /// Lenient decrypt: empty in, empty out.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }

        let raw = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CipherError::InvalidEncoding)?;

        let cipher = Aes256CbcDec::new_from_slices(&self.key, &self.iv)
            .map_err(|_| CipherError::Cipher)?;
        let plain = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&raw)
            .map_err(|_| CipherError::Cipher)?;

        String::from_utf8(plain).map_err(|_| CipherError::InvalidUtf8)
    }

    pub fn encrypt_identity(&self, identity: &str) -> Result<String, CipherError> {
        if identity.trim().is_empty() {
            return Err(CipherError::EmptyInput);
        }
        self.encrypt(identity)
    }

    pub fn decrypt_identity(&self, envelope: &str) -> Result<String, CipherError> {
        if envelope.trim().is_empty() {
            return Err(CipherError::EmptyInput);
        }
        let identity = self.decrypt(envelope)?;
        if identity.is_empty() {
            return Err(CipherError::EmptyInput);
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";
    const IV: &[u8] = b"abcdef9876543210";

    fn cipher() -> IdentityCipher {
        IdentityCipher::new(KEY, IV).expect("valid key/iv")
    }

    #[test]
    fn email_identity_round_trips() {
        let cipher = cipher();
        let envelope = cipher.encrypt("user@example.com").unwrap();

        assert_ne!(envelope, "user@example.com");
        assert_eq!(cipher.decrypt(&envelope).unwrap(), "user@example.com");
    }

    #[test]
    fn multibyte_identity_round_trips() {
        let cipher = cipher();
        let envelope = cipher.encrypt_identity("ユーザー-42").unwrap();
        assert_eq!(cipher.decrypt_identity(&envelope).unwrap(), "ユーザー-42");
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let cipher = cipher();
        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }

    #[test]
    fn fixed_iv_is_deterministic() {
        let cipher = cipher();
        assert_eq!(
            cipher.encrypt("same").unwrap(),
            cipher.encrypt("same").unwrap()
        );
    }

    #[test]
    fn wrong_key_or_iv_length_is_rejected() {
        assert!(matches!(
            IdentityCipher::new(b"short", IV),
            Err(CipherError::InvalidKeyLength { actual: 5 })
        ));
        assert!(matches!(
            IdentityCipher::new(KEY, b"0123456789abcdef0"),
            Err(CipherError::InvalidIvLength { actual: 17 })
        ));
    }

    #[test]
    fn strict_variants_separate_bad_input_from_cipher_failure() {
        let cipher = cipher();

        let empty = cipher.decrypt_identity("  ").unwrap_err();
        assert!(empty.is_bad_input());

        let not_base64 = cipher.decrypt_identity("%%%").unwrap_err();
        assert!(matches!(not_base64, CipherError::InvalidEncoding));

        // Valid base64, but not a whole AES block.
        let short_block = cipher.decrypt_identity("AAAA").unwrap_err();
        assert!(matches!(short_block, CipherError::Cipher));
        assert!(!short_block.is_bad_input());

        assert!(matches!(
            cipher.encrypt_identity(""),
            Err(CipherError::EmptyInput)
        ));
    }

    #[test]
    fn envelope_from_another_key_does_not_decrypt() {
        let other = IdentityCipher::new(b"fedcba9876543210fedcba9876543210", IV).unwrap();
        let envelope = other.encrypt("user@example.com").unwrap();

        match cipher().decrypt_identity(&envelope) {
            Ok(plain) => assert_ne!(plain, "user@example.com"),
            Err(err) => assert!(!err.is_bad_input()),
        }
    }
}
