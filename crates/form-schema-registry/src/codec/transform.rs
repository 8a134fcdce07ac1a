//! Payload transforms
//!
//! Encoded documents optionally pass through gzip compression and
//! AES-256-GCM encryption before they reach storage or cache. The
//! reverse pipeline runs on the way out.

use crate::config::FeaturesConfig;
use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::RngCore;
use std::io::{Read, Write};

const NONCE_LEN: usize = 12;

/// Compression and encryption pipeline
#[derive(Clone, Default)]
pub struct PayloadTransform {
    /// Gzip payloads
    compress: bool,

    /// Cipher used when encryption is enabled
    cipher: Option<Aes256Gcm>,
}

impl std::fmt::Debug for PayloadTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadTransform")
            .field("compress", &self.compress)
            .field("encrypt", &self.cipher.is_some())
            .finish()
    }
}

impl PayloadTransform {
    /// Identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build the pipeline from the feature switches
    pub fn from_features(features: &FeaturesConfig) -> SchemaRegistryResult<Self> {
        let cipher = if features.enable_encryption {
            let key = features
                .decoded_encryption_key()
                .map_err(|e| SchemaRegistryError::config(&e))?;
            Some(Self::cipher_from_key(&key)?)
        } else {
            None
        };

        Ok(Self {
            compress: features.enable_compression,
            cipher,
        })
    }

    /// Enable or disable gzip compression
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Enable encryption with a raw 32 byte key
    pub fn with_encryption_key(mut self, key: &[u8]) -> SchemaRegistryResult<Self> {
        self.cipher = Some(Self::cipher_from_key(key)?);
        Ok(self)
    }

    fn cipher_from_key(key: &[u8]) -> SchemaRegistryResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(key).map_err(|e| {
            SchemaRegistryError::config(&format!("invalid encryption key: {}", e))
        })
    }

    /// Whether bytes pass through unchanged
    pub fn is_identity(&self) -> bool {
        !self.compress && self.cipher.is_none()
    }

    /// Transform encoded bytes into their stored form
    pub fn apply(&self, bytes: Vec<u8>) -> SchemaRegistryResult<Vec<u8>> {
        let mut data = bytes;

        if self.compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data).map_err(|e| {
                SchemaRegistryError::serialization(&format!("compression failed: {}", e))
            })?;
            data = encoder.finish().map_err(|e| {
                SchemaRegistryError::serialization(&format!("compression failed: {}", e))
            })?;
        }

        if let Some(cipher) = &self.cipher {
            let mut nonce_bytes = [0u8; NONCE_LEN];
            rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
            let nonce = Nonce::from_slice(&nonce_bytes);

            let ciphertext = cipher.encrypt(nonce, data.as_ref()).map_err(|e| {
                SchemaRegistryError::serialization(&format!("encryption failed: {}", e))
            })?;

            let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
            sealed.extend_from_slice(&nonce_bytes);
            sealed.extend_from_slice(&ciphertext);
            data = sealed;
        }

        Ok(data)
    }

    /// Recover encoded bytes from their stored form
    pub fn revert(&self, bytes: Vec<u8>) -> SchemaRegistryResult<Vec<u8>> {
        let mut data = bytes;

        if let Some(cipher) = &self.cipher {
            if data.len() < NONCE_LEN {
                return Err(SchemaRegistryError::deserialization(
                    "encrypted payload shorter than its nonce",
                ));
            }
            let nonce = Nonce::from_slice(&data[..NONCE_LEN]);
            data = cipher.decrypt(nonce, &data[NONCE_LEN..]).map_err(|e| {
                SchemaRegistryError::deserialization(&format!("decryption failed: {}", e))
            })?;
        }

        if self.compress {
            let mut decoder = GzDecoder::new(&data[..]);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed).map_err(|e| {
                SchemaRegistryError::deserialization(&format!("decompression failed: {}", e))
            })?;
            data = decompressed;
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    const PAYLOAD: &[u8] = br#"{"id":"user.profile","version":"1.0.0","title":"User"}"#;

    #[test]
    fn test_identity_passthrough() {
        let transform = PayloadTransform::identity();
        assert!(transform.is_identity());
        assert_eq!(transform.apply(PAYLOAD.to_vec()).unwrap(), PAYLOAD);
        assert_eq!(transform.revert(PAYLOAD.to_vec()).unwrap(), PAYLOAD);
    }

    #[test]
    fn test_compression_and_encryption() {
        let transform = PayloadTransform::identity()
            .with_compression(true)
            .with_encryption_key(&[3u8; 32])
            .unwrap();

        let sealed = transform.apply(PAYLOAD.to_vec()).unwrap();
        assert_ne!(sealed, PAYLOAD);
        assert_eq!(transform.revert(sealed.clone()).unwrap(), PAYLOAD);

        // a fresh nonce per write
        assert_ne!(transform.apply(PAYLOAD.to_vec()).unwrap(), sealed);
    }

    #[test]
    fn test_tampered_ciphertext_is_a_decode_error() {
        let transform = PayloadTransform::identity()
            .with_encryption_key(&[9u8; 32])
            .unwrap();
        let mut sealed = transform.apply(PAYLOAD.to_vec()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;

        let err = transform.revert(sealed).unwrap_err();
        assert!(matches!(err, SchemaRegistryError::Deserialization { .. }));

        let err = transform.revert(vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, SchemaRegistryError::Deserialization { .. }));
    }

    #[test]
    fn test_from_features() {
        let mut features = FeaturesConfig::default();
        assert!(PayloadTransform::from_features(&features)
            .unwrap()
            .is_identity());

        features.enable_encryption = true;
        assert!(PayloadTransform::from_features(&features).is_err());

        features.encryption_key =
            Some(base64::engine::general_purpose::STANDARD.encode([1u8; 32]));
        features.enable_compression = true;
        let transform = PayloadTransform::from_features(&features).unwrap();
        assert!(!transform.is_identity());
    }
}
