use crate::application_port::*;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key path is empty")]
    EmptyPath,
    #[error("failed to read key file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse RSA {kind} key: {reason}")]
    Parse { kind: &'static str, reason: String },
    #[error("public key does not belong to the private key")]
    Mismatch,
    #[error("failed to encode RSA key: {0}")]
    Encode(String),
}

/// The issuer's RS256 keypair, loaded once at startup.
///
/// Both PKCS#8 (`BEGIN PRIVATE KEY` / `BEGIN PUBLIC KEY`) and PKCS#1
/// (`BEGIN RSA ...`) encodings are accepted.
pub struct SigningKeyProvider {
    key_id: String,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    decoding_key: Arc<DecodingKey>,
}

impl SigningKeyProvider {
    pub async fn load(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
        key_id: impl Into<String>,
    ) -> Result<Self, KeyError> {
        let private_pem = read_key_file(private_key_path.as_ref()).await?;
        let public_pem = read_key_file(public_key_path.as_ref()).await?;
        Self::from_pem(&private_pem, &public_pem, key_id)
    }

    pub fn from_pem(
        private_pem: &str,
        public_pem: &str,
        key_id: impl Into<String>,
    ) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
            .map_err(|e| KeyError::Parse {
                kind: "private",
                reason: e.to_string(),
            })?;
        let public_key = RsaPublicKey::from_public_key_pem(public_pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_pem))
            .map_err(|e| KeyError::Parse {
                kind: "public",
                reason: e.to_string(),
            })?;

        if RsaPublicKey::from(&private_key) != public_key {
            return Err(KeyError::Mismatch);
        }

        let public_der = public_key
            .to_pkcs1_der()
            .map_err(|e| KeyError::Encode(e.to_string()))?;
        let decoding_key = Arc::new(DecodingKey::from_rsa_der(public_der.as_bytes()));

        Ok(Self {
            key_id: key_id.into(),
            private_key,
            public_key,
            decoding_key,
        })
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// A fresh signing key built from the current private key. Not cached
    /// between calls so a swapped keypair takes effect on the next token.
    pub fn encoding_key(&self) -> Result<EncodingKey, KeyError> {
        let der = self
            .private_key
            .to_pkcs1_der()
            .map_err(|e| KeyError::Encode(e.to_string()))?;
        Ok(EncodingKey::from_rsa_der(der.as_bytes()))
    }

    /// Big-endian modulus and exponent of the public key.
    pub fn public_components(&self) -> (Vec<u8>, Vec<u8>) {
        (
            self.public_key.n().to_bytes_be(),
            self.public_key.e().to_bytes_be(),
        )
    }
}

#[async_trait::async_trait]
impl VerificationKeySource for SigningKeyProvider {
    async fn verification_key(&self) -> Result<Arc<DecodingKey>, AuthError> {
        Ok(self.decoding_key.clone())
    }
}

async fn read_key_file(path: &Path) -> Result<String, KeyError> {
    if path.as_os_str().is_empty() {
        return Err(KeyError::EmptyPath);
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| KeyError::Read {
            path: path.to_path_buf(),
            source,
        })
}
