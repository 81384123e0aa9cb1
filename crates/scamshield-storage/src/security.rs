//! Security and encryption primitives
//!
//! AES-256-CBC with PKCS7 padding for the legacy-compatible formats,
//! AES-256-GCM for the opt-in authenticated format, SHA-256 digests and
//! OS-backed random bytes.

use crate::{Error, Result};
use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Symmetric key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;
/// CBC initialization vector length in bytes
pub const IV_LEN: usize = 16;
/// GCM nonce length in bytes
pub const NONCE_LEN: usize = 12;
/// AES block size in bytes
const BLOCK_LEN: usize = 16;

/// Encryption algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    /// AES-256-CBC with PKCS7 padding (no authentication tag)
    #[serde(rename = "AES-256-CBC")]
    Aes256Cbc,
    /// AES-256-GCM (authenticated)
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,
}

impl EncryptionAlgorithm {
    /// Display name, matching the config spelling
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aes256Cbc => "AES-256-CBC",
            Self::Aes256Gcm => "AES-256-GCM",
        }
    }

    /// Key size in bits
    pub fn key_size_bits(&self) -> u32 {
        (KEY_LEN * 8) as u32
    }

    /// Whether ciphertext tampering is detected on decrypt
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Aes256Gcm)
    }
}

impl Default for EncryptionAlgorithm {
    fn default() -> Self {
        Self::Aes256Cbc
    }
}

impl std::fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fill an array from the OS CSPRNG
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// SHA-256 digest
pub fn hash_sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 digest, lowercase hex
pub fn hash_sha256_hex(data: &[u8]) -> String {
    hex::encode(hash_sha256(data))
}

/// Encrypt with AES-256-CBC / PKCS7
pub fn cbc_encrypt(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt AES-256-CBC / PKCS7
///
/// Fails on a wrong IV length, a ciphertext that is not a whole number of
/// blocks, or invalid padding. A wrong key usually surfaces as bad padding,
/// but not always: CBC carries no tag.
pub fn cbc_decrypt(key: &[u8; KEY_LEN], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != IV_LEN {
        return Err(Error::Decryption(format!(
            "Invalid IV length: expected {}, got {}",
            IV_LEN,
            iv.len()
        )));
    }
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(Error::Decryption(format!(
            "Invalid ciphertext length: {}",
            ciphertext.len()
        )));
    }

    let decryptor = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| Error::Decryption(e.to_string()))?;

    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::Decryption("Invalid padding".to_string()))
}

/// Encrypt with AES-256-GCM under a fresh random nonce
pub fn gcm_encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce_bytes = random_bytes::<NONCE_LEN>();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| Error::Encryption(e.to_string()))?;
    Ok((nonce_bytes, ciphertext))
}

/// Decrypt AES-256-GCM; fails on any tampering
pub fn gcm_decrypt(key: &[u8; KEY_LEN], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN {
        return Err(Error::Decryption(format!(
            "Invalid nonce length: expected {}, got {}",
            NONCE_LEN,
            nonce.len()
        )));
    }
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Decryption("Authentication tag mismatch".to_string()))
}
