//! Device-local encryption service
//!
//! Owns the persisted key material (symmetric key + base IV) and exposes
//! encrypt/decrypt/hash. Nothing outside this module reads raw key bytes.
//!
//! Ciphertext formats:
//! - AES-256-CBC (default): `ivBase64:ciphertextBase64`
//! - AES-256-GCM (opt-in): `v2:nonceBase64:ciphertextBase64`
//!
//! `decrypt` accepts both regardless of the configured algorithm.

use crate::keystore::KeyStore;
use crate::security::{
    cbc_decrypt, cbc_encrypt, gcm_decrypt, gcm_encrypt, hash_sha256_hex, random_bytes,
    EncryptionAlgorithm, IV_LEN, KEY_LEN,
};
use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Key store entry holding the symmetric key
pub const ENCRYPTION_KEY_ENTRY: &str = "scamshield_encryption_key";
/// Key store entry holding the base IV
pub const ENCRYPTION_IV_ENTRY: &str = "scamshield_encryption_iv";

const GCM_FORMAT_TAG: &str = "v2";

/// Persisted key material
#[derive(Clone)]
pub struct KeyMaterial {
    symmetric_key: Zeroizing<[u8; KEY_LEN]>,
    base_iv: [u8; IV_LEN],
}

impl KeyMaterial {
    /// Generate fresh random key material
    pub fn generate() -> Self {
        Self {
            symmetric_key: Zeroizing::new(random_bytes::<KEY_LEN>()),
            base_iv: random_bytes::<IV_LEN>(),
        }
    }

    fn from_encoded(key_b64: &str, iv_b64: &str) -> Result<Self> {
        let key = Zeroizing::new(
            STANDARD
                .decode(key_b64)
                .map_err(|e| Error::KeyStore(format!("Stored key is not base64: {}", e)))?,
        );
        let iv = STANDARD
            .decode(iv_b64)
            .map_err(|e| Error::KeyStore(format!("Stored IV is not base64: {}", e)))?;

        if key.len() != KEY_LEN || iv.len() != IV_LEN {
            return Err(Error::KeyStore(format!(
                "Stored key material has wrong length (key={}, iv={})",
                key.len(),
                iv.len()
            )));
        }

        let mut symmetric_key = Zeroizing::new([0u8; KEY_LEN]);
        symmetric_key.copy_from_slice(&key);
        let mut base_iv = [0u8; IV_LEN];
        base_iv.copy_from_slice(&iv);

        Ok(Self {
            symmetric_key,
            base_iv,
        })
    }

    fn encode(&self) -> (Zeroizing<String>, String) {
        (
            Zeroizing::new(STANDARD.encode(&self.symmetric_key[..])),
            STANDARD.encode(self.base_iv),
        )
    }

    /// Short, non-reversible identifier for the key (first 8 hex chars of its SHA-256)
    pub fn fingerprint(&self) -> String {
        hash_sha256_hex(&self.symmetric_key[..])[..8].to_string()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Key lifecycle + symmetric encryption for at-rest data
pub struct EncryptionService {
    store: Arc<dyn KeyStore>,
    algorithm: EncryptionAlgorithm,
    material: RwLock<Option<KeyMaterial>>,
}

impl EncryptionService {
    /// Create service using the default (AES-256-CBC) algorithm
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self::with_algorithm(store, EncryptionAlgorithm::default())
    }

    /// Create service with an explicit algorithm for new ciphertexts
    pub fn with_algorithm(store: Arc<dyn KeyStore>, algorithm: EncryptionAlgorithm) -> Self {
        Self {
            store,
            algorithm,
            material: RwLock::new(None),
        }
    }

    /// Algorithm used for new ciphertexts
    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    /// Load persisted key material, generating and persisting it when absent.
    ///
    /// Concurrent callers serialize on the material lock, so generation runs
    /// at most once.
    pub async fn initialize(&self) -> Result<()> {
        self.material().await.map(|_| ())
    }

    async fn material(&self) -> Result<KeyMaterial> {
        if let Some(material) = self.material.read().await.as_ref() {
            return Ok(material.clone());
        }

        let mut slot = self.material.write().await;
        if let Some(material) = slot.as_ref() {
            return Ok(material.clone());
        }

        let material = match self.load().await? {
            Some(material) => {
                debug!("Loaded key material {}", material.fingerprint());
                material
            }
            None => {
                warn!(
                    "{}; generating new keys (data encrypted under earlier keys is unreadable)",
                    Error::KeyMaterialMissing("no usable key material in key store".to_string())
                );
                self.generate_new_keys().await?
            }
        };

        *slot = Some(material.clone());
        Ok(material)
    }

    async fn load(&self) -> Result<Option<KeyMaterial>> {
        let key = self.store.get(ENCRYPTION_KEY_ENTRY).await?.map(Zeroizing::new);
        let iv = self.store.get(ENCRYPTION_IV_ENTRY).await?;

        match (key, iv) {
            (Some(key), Some(iv)) => match KeyMaterial::from_encoded(&key, &iv) {
                Ok(material) => Ok(Some(material)),
                Err(e) => {
                    warn!("Stored key material unusable: {}", e);
                    Ok(None)
                }
            },
            _ => Ok(None),
        }
    }

    async fn generate_new_keys(&self) -> Result<KeyMaterial> {
        let material = KeyMaterial::generate();
        let (key_b64, iv_b64) = material.encode();

        self.store.set(ENCRYPTION_KEY_ENTRY, &key_b64).await?;
        self.store.set(ENCRYPTION_IV_ENTRY, &iv_b64).await?;

        info!("Generated new key material {}", material.fingerprint());
        Ok(material)
    }

    /// Encrypt a string under the device-local key with a fresh IV/nonce
    pub async fn encrypt(&self, plaintext: &str) -> Result<String> {
        let material = self.material().await?;

        match self.algorithm {
            EncryptionAlgorithm::Aes256Cbc => {
                let iv = random_bytes::<IV_LEN>();
                let ciphertext = cbc_encrypt(&material.symmetric_key, &iv, plaintext.as_bytes());
                Ok(format!("{}:{}", STANDARD.encode(iv), STANDARD.encode(ciphertext)))
            }
            EncryptionAlgorithm::Aes256Gcm => {
                let (nonce, ciphertext) =
                    gcm_encrypt(&material.symmetric_key, plaintext.as_bytes())?;
                Ok(format!(
                    "{}:{}:{}",
                    GCM_FORMAT_TAG,
                    STANDARD.encode(nonce),
                    STANDARD.encode(ciphertext)
                ))
            }
        }
    }

    /// Decrypt a payload produced by [`encrypt`](Self::encrypt)
    pub async fn decrypt(&self, payload: &str) -> Result<String> {
        let material = self.material().await?;
        let parts: Vec<&str> = payload.split(':').collect();

        let plaintext = match parts.as_slice() {
            [iv, ciphertext] => {
                let iv = decode_part(iv, "IV")?;
                let ciphertext = decode_part(ciphertext, "ciphertext")?;
                cbc_decrypt(&material.symmetric_key, &iv, &ciphertext)?
            }
            [tag, nonce, ciphertext] if *tag == GCM_FORMAT_TAG => {
                let nonce = decode_part(nonce, "nonce")?;
                let ciphertext = decode_part(ciphertext, "ciphertext")?;
                gcm_decrypt(&material.symmetric_key, &nonce, &ciphertext)?
            }
            _ => {
                return Err(Error::Decryption(
                    "Malformed payload: expected iv:ciphertext".to_string(),
                ))
            }
        };

        String::from_utf8(plaintext)
            .map_err(|_| Error::Decryption("Plaintext is not valid UTF-8".to_string()))
    }

    /// One-way SHA-256 digest (lowercase hex) for integrity comparisons
    pub fn generate_hash(&self, data: &str) -> String {
        hash_sha256_hex(data.as_bytes())
    }

    /// Replace the key material. Ciphertext under the old key becomes
    /// permanently undecryptable.
    pub async fn rotate_keys(&self) -> Result<()> {
        let mut slot = self.material.write().await;
        let previous = slot.as_ref().map(KeyMaterial::fingerprint);
        let material = self.generate_new_keys().await?;

        info!(
            "Rotated key material {} -> {}",
            previous.as_deref().unwrap_or("<none>"),
            material.fingerprint()
        );
        *slot = Some(material);
        Ok(())
    }

    /// Delete persisted key material (logout)
    pub async fn clear_keys(&self) -> Result<()> {
        let mut slot = self.material.write().await;
        self.store.delete(ENCRYPTION_KEY_ENTRY).await?;
        self.store.delete(ENCRYPTION_IV_ENTRY).await?;
        *slot = None;
        info!("Cleared key material");
        Ok(())
    }

    /// Whether key material is loaded or persisted
    pub async fn has_keys(&self) -> Result<bool> {
        if self.material.read().await.is_some() {
            return Ok(true);
        }
        Ok(self.load().await?.is_some())
    }

    /// Fingerprint of the active key; generates keys when none exist
    pub async fn key_fingerprint(&self) -> Result<String> {
        Ok(self.material().await?.fingerprint())
    }
}

fn decode_part(part: &str, what: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(part)
        .map_err(|e| Error::Decryption(format!("Invalid {} encoding: {}", what, e)))
}
