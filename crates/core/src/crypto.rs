//! Symmetric authenticated encryption for stored platform credentials.
//!
//! Envelope format is `nonce:tag:ciphertext`, hex-encoded. Malformed or
//! tampered input fails closed; callers decide whether to degrade.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_LEN} bytes hex-encoded")]
    InvalidKey,
    #[error("invalid credential envelope: {0}")]
    InvalidEnvelope(String),
    #[error("credential decryption failed")]
    DecryptionFailed,
    #[error("credential encryption failed")]
    EncryptionFailed,
}

/// AES-256-GCM cipher bound to the configured platform key.
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; KEY_LEN],
}

impl CredentialCipher {
    pub fn from_hex_key(key: &SecretString) -> Result<Self, CryptoError> {
        let decoded = hex::decode(key.expose_secret()).map_err(|_| CryptoError::InvalidKey)?;
        let key: [u8; KEY_LEN] = decoded.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|_| CryptoError::EncryptionFailed)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(format!("{}:{}:{}", hex::encode(nonce_bytes), hex::encode(tag), hex::encode(sealed)))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let parts: Vec<&str> = envelope.split(':').collect();
        let [nonce_hex, tag_hex, ciphertext_hex] = parts.as_slice() else {
            return Err(CryptoError::InvalidEnvelope(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        };

        let nonce_bytes = hex::decode(nonce_hex)
            .map_err(|_| CryptoError::InvalidEnvelope("nonce is not hex".to_string()))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::InvalidEnvelope("nonce length is invalid".to_string()));
        }
        let tag = hex::decode(tag_hex)
            .map_err(|_| CryptoError::InvalidEnvelope("tag is not hex".to_string()))?;
        if tag.len() != TAG_LEN {
            return Err(CryptoError::InvalidEnvelope("tag length is invalid".to_string()));
        }
        let mut sealed = hex::decode(ciphertext_hex)
            .map_err(|_| CryptoError::InvalidEnvelope("ciphertext is not hex".to_string()))?;
        sealed.extend_from_slice(&tag);

        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|_| CryptoError::DecryptionFailed)?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext =
            cipher.decrypt(nonce, sealed.as_ref()).map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::InvalidEnvelope("plaintext is not utf-8".to_string()))
    }
}

/// Generate a fresh hex-encoded key suitable for configuration.
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    hex::encode(key)
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{generate_key, CredentialCipher, CryptoError};

    fn cipher() -> CredentialCipher {
        CredentialCipher::from_hex_key(&SecretString::from(generate_key())).expect("valid key")
    }

    #[test]
    fn round_trips_credentials() {
        let cipher = cipher();
        let envelope = cipher.encrypt("tok_0c6e7f").expect("encrypt");
        assert_eq!(envelope.split(':').count(), 3);
        assert_eq!(cipher.decrypt(&envelope).expect("decrypt"), "tok_0c6e7f");
    }

    #[test]
    fn rejects_malformed_envelope() {
        let cipher = cipher();
        assert!(matches!(
            cipher.decrypt("not-an-envelope"),
            Err(CryptoError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = cipher();
        let envelope = cipher.encrypt("tok_0c6e7f").expect("encrypt");
        let mut parts: Vec<String> = envelope.split(':').map(str::to_string).collect();
        parts[2] = parts[2].chars().rev().collect();
        assert!(matches!(
            cipher.decrypt(&parts.join(":")),
            Err(CryptoError::DecryptionFailed) | Err(CryptoError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn rejects_wrong_key() {
        let envelope = cipher().encrypt("token").expect("encrypt");
        let other = cipher();
        assert!(matches!(other.decrypt(&envelope), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn rejects_short_key() {
        let result = CredentialCipher::from_hex_key(&SecretString::from("deadbeef".to_string()));
        assert!(matches!(result, Err(CryptoError::InvalidKey)));
    }
}
