//! Transport-domain encryption
//!
//! The key is SHA-256 of a secret shared with the server. A fresh IV is
//! generated per message and travels next to the ciphertext; nothing in this
//! domain is ever persisted.

use crate::security::{cbc_decrypt, cbc_encrypt, hash_sha256, random_bytes, IV_LEN, KEY_LEN};
use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use zeroize::Zeroizing;

/// Encrypted transport body plus its IV, both Base64
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportPayload {
    /// Base64 ciphertext (request/response body)
    pub ciphertext: String,
    /// Base64 IV (sent in a header)
    pub iv: String,
}

/// AES-256-CBC cipher keyed from the pre-shared transport secret
pub struct TransportCipher {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl TransportCipher {
    /// Derive the transport key from the shared secret
    pub fn from_shared_secret(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Encryption(
                "Transport shared secret is empty".to_string(),
            ));
        }
        Ok(Self {
            key: Zeroizing::new(hash_sha256(secret.as_bytes())),
        })
    }

    /// Encrypt a body under a fresh IV
    pub fn encrypt(&self, plaintext: &str) -> TransportPayload {
        let iv = random_bytes::<IV_LEN>();
        let ciphertext = cbc_encrypt(&self.key, &iv, plaintext.as_bytes());
        TransportPayload {
            ciphertext: STANDARD.encode(ciphertext),
            iv: STANDARD.encode(iv),
        }
    }

    /// Decrypt a Base64 body with its Base64 IV
    pub fn decrypt(&self, ciphertext_b64: &str, iv_b64: &str) -> Result<String> {
        let iv = STANDARD
            .decode(iv_b64.trim())
            .map_err(|e| Error::Decryption(format!("Invalid IV encoding: {}", e)))?;
        let ciphertext = STANDARD
            .decode(ciphertext_b64.trim())
            .map_err(|e| Error::Decryption(format!("Invalid ciphertext encoding: {}", e)))?;

        let plaintext = cbc_decrypt(&self.key, &iv, &ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|_| Error::Decryption("Plaintext is not valid UTF-8".to_string()))
    }
}

impl std::fmt::Debug for TransportCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TransportCipher { .. }")
    }
}
