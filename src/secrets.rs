//! Secure value resolution
//!
//! Secret settings are stored as base64 of encrypted bytes. The resolver
//! decodes and decrypts a named value, falling back to a caller supplied
//! literal whenever the value is missing or cannot be decrypted.

use base64::Engine;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::DecryptError;

/// Secret settings of one integration: field name to base64 ciphertext
pub type SecureSettings = BTreeMap<String, String>;

/// Secret store seam: turns stored ciphertext into plaintext
pub trait SecretDecrypter: Send + Sync {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError>;
}

/// Decrypter for stores that keep plaintext behind the base64 envelope
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextDecrypter;

impl SecretDecrypter for PlaintextDecrypter {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        Ok(ciphertext.to_vec())
    }
}

/// Resolve `key` from `secure_settings`, returning `fallback` when the key is
/// absent or its value cannot be decoded and decrypted.
pub fn resolve(
    decrypter: &dyn SecretDecrypter,
    secure_settings: &SecureSettings,
    key: &str,
    fallback: &str,
) -> String {
    let Some(stored) = secure_settings.get(key) else {
        return fallback.to_string();
    };

    match decrypt_value(decrypter, stored) {
        Ok(plain) => plain,
        Err(e) => {
            tracing::debug!(key, error = %e, "secure setting could not be decrypted, using fallback");
            fallback.to_string()
        }
    }
}

fn decrypt_value(decrypter: &dyn SecretDecrypter, stored: &str) -> Result<String, DecryptError> {
    let ciphertext = base64::engine::general_purpose::STANDARD.decode(stored)?;
    let plain = decrypter.decrypt(&ciphertext)?;
    String::from_utf8(plain).map_err(|e| DecryptError::Cipher(format!("plaintext is not UTF-8: {}", e)))
}

/// Encode a plaintext secret the way it is stored at rest by [`PlaintextDecrypter`]
pub fn encode_for_storage(plain: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(plain.as_bytes())
}

/// Secret settings bound to the decrypter that can open them
#[derive(Clone)]
pub struct SecureValues<'a> {
    decrypter: Arc<dyn SecretDecrypter>,
    settings: &'a SecureSettings,
}

impl<'a> SecureValues<'a> {
    pub fn new(decrypter: Arc<dyn SecretDecrypter>, settings: &'a SecureSettings) -> Self {
        Self {
            decrypter,
            settings,
        }
    }

    pub fn get(&self, key: &str, fallback: &str) -> String {
        resolve(self.decrypter.as_ref(), self.settings, key, fallback)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.settings.contains_key(key)
    }
}
