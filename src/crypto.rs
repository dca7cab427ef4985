use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// AES-256-GCM cipher for provider API keys at rest.
///
/// Ciphertext format: `hex(nonce) + ":" + hex(ciphertext)`.
#[derive(Clone)]
pub struct KeyCipher {
    cipher: Aes256Gcm,
}

impl KeyCipher {
    pub fn from_hex(key_hex: &str) -> Result<Self, AppError> {
        let key = hex::decode(key_hex.trim())
            .map_err(|e| AppError::Crypto(format!("Invalid encryption key: {e}")))?;
        if key.len() != 32 {
            return Err(AppError::Crypto(format!(
                "Encryption key must be 32 bytes, got {}",
                key.len()
            )));
        }
        Self::from_bytes(&key)
    }

    pub fn from_bytes(key: &[u8]) -> Result<Self, AppError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| AppError::Crypto(format!("Failed to create cipher: {e}")))?;
        Ok(Self { cipher })
    }

    /// Random key, valid only for the lifetime of the process.
    pub fn ephemeral() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let nonce_bytes: [u8; 12] = rand::thread_rng().gen();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Crypto(format!("Encryption failed: {e}")))?;

        Ok(format!("{}:{}", hex::encode(nonce_bytes), hex::encode(ciphertext)))
    }

    pub fn decrypt(&self, encrypted: &str) -> Result<String, AppError> {
        let (nonce_hex, body_hex) = encrypted
            .split_once(':')
            .ok_or_else(|| AppError::Crypto("Invalid encrypted format".to_string()))?;

        let nonce_bytes =
            hex::decode(nonce_hex).map_err(|e| AppError::Crypto(format!("Invalid nonce: {e}")))?;
        if nonce_bytes.len() != 12 {
            return Err(AppError::Crypto("Invalid nonce length".to_string()));
        }
        let ciphertext = hex::decode(body_hex)
            .map_err(|e| AppError::Crypto(format!("Invalid ciphertext: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| AppError::Crypto(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext).map_err(|e| AppError::Crypto(format!("Invalid UTF-8: {e}")))
    }
}

/// Display form of a secret: first and last four characters.
pub fn mask_api_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return None;
    }
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return Some("****".to_string());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    Some(format!("{head}...{tail}"))
}

/// Opaque bearer token handed to a user once at registration.
pub fn generate_access_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Tokens are stored and looked up by digest only.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
