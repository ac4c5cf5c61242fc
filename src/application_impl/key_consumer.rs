use crate::application_port::*;
use crate::domain_model::*;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::DecodingKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{BigUint, RsaPublicKey};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum KeyConsumerError {
    #[error("failed to build http client: {0}")]
    Client(String),
    #[error("failed to fetch key set: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("key set is empty")]
    EmptyKeySet,
    #[error("unsupported key type {0:?}")]
    UnsupportedKeyType(String),
    #[error("malformed key: {0}")]
    Malformed(String),
    #[error("key file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct KeyConsumerConfig {
    pub key_service_url: String,
    pub local_key_path: PathBuf,
    pub fetch_timeout: Duration,
}

/// Result of a background refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// The fetch failed and the previously trusted key stays in use.
    KeptCached,
    /// The fetch failed and there is no key to fall back to.
    NoKey,
}

/// Obtains the issuer's public key on the verifying side.
///
/// Lookup order is the in-process key, then the PEM cache at
/// `local_key_path`, then the issuer's JWKS endpoint. A successful fetch
/// replaces the cache file atomically.
pub struct KeyConsumer {
    cfg: KeyConsumerConfig,
    client: reqwest::Client,
    current: RwLock<Option<Arc<DecodingKey>>>,
    refresh_lock: Mutex<()>,
    refresh_requested: Notify,
}

impl KeyConsumer {
    pub fn new(cfg: KeyConsumerConfig) -> Result<Self, KeyConsumerError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.fetch_timeout)
            .build()
            .map_err(|e| KeyConsumerError::Client(e.to_string()))?;
        Ok(Self {
            cfg,
            client,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refresh_requested: Notify::new(),
        })
    }

    pub async fn has_key(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn get_signing_key(&self) -> Result<Arc<DecodingKey>, AuthError> {
        if let Some(key) = self.current.read().await.clone() {
            return Ok(key);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have populated the key while we waited.
        if let Some(key) = self.current.read().await.clone() {
            return Ok(key);
        }

        let had_cache_file = match self.load_key_from_file().await {
            Ok(Some(key)) => {
                info!(path = ?self.cfg.local_key_path, "verification key loaded from cache file");
                *self.current.write().await = Some(key.clone());
                return Ok(key);
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "cached verification key unusable");
                true
            }
        };

        match self.fetch_and_store().await {
            Ok(key) => Ok(key),
            Err(e) => {
                warn!(error = %e, "no verification key available");
                Err(AuthError::KeyUnavailable {
                    has_cached_key: had_cache_file,
                })
            }
        }
    }

    /// Force a fetch. On success the new key replaces the current one.
    pub async fn refresh(&self) -> Result<Arc<DecodingKey>, KeyConsumerError> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store().await
    }

    pub async fn refresh_with_fallback(&self) -> RefreshOutcome {
        match self.refresh().await {
            Ok(_) => RefreshOutcome::Refreshed,
            Err(e) if self.has_key().await => {
                warn!(error = %e, "key refresh failed, keeping cached key");
                RefreshOutcome::KeptCached
            }
            Err(e) => {
                warn!(error = %e, "key refresh failed and no key is cached");
                RefreshOutcome::NoKey
            }
        }
    }

    /// Ask the background worker for an out-of-band refresh. Requests made
    /// before the worker gets to them collapse into one.
    pub fn request_refresh(&self) {
        self.refresh_requested.notify_one();
    }

    pub async fn refresh_requested(&self) {
        self.refresh_requested.notified().await;
    }

    // Caller holds `refresh_lock`.
    async fn fetch_and_store(&self) -> Result<Arc<DecodingKey>, KeyConsumerError> {
        let jwks = self.fetch_jwks().await?;
        let jwk = jwks.keys.first().ok_or(KeyConsumerError::EmptyKeySet)?;
        let pem = jwks_to_pem(jwk)?;
        let key = Arc::new(decoding_key_from_pem(&pem)?);
        save_key_to_file(&self.cfg.local_key_path, &pem).await?;
        *self.current.write().await = Some(key.clone());
        info!(kid = %jwk.kid, "verification key refreshed from key service");
        Ok(key)
    }

    pub async fn fetch_jwks(&self) -> Result<JsonWebKeySet, KeyConsumerError> {
        debug!(url = %self.cfg.key_service_url, "fetching key set");
        let jwks = self
            .client
            .get(&self.cfg.key_service_url)
            .send()
            .await?
            .error_for_status()?
            .json::<JsonWebKeySet>()
            .await?;
        Ok(jwks)
    }

    /// `Ok(None)` when no cache file exists.
    pub async fn load_key_from_file(&self) -> Result<Option<Arc<DecodingKey>>, KeyConsumerError> {
        let path = &self.cfg.local_key_path;
        let pem = match tokio::fs::read_to_string(path).await {
            Ok(pem) => pem,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(KeyConsumerError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };
        Ok(Some(Arc::new(decoding_key_from_pem(&pem)?)))
    }
}

#[async_trait::async_trait]
impl VerificationKeySource for KeyConsumer {
    async fn verification_key(&self) -> Result<Arc<DecodingKey>, AuthError> {
        self.get_signing_key().await
    }

    fn signature_rejected(&self) {
        self.request_refresh();
    }
}

/// Rebuild an RSA public key from its JWK modulus and exponent and encode it
/// as an SPKI PEM (`BEGIN PUBLIC KEY`).
pub fn jwks_to_pem(jwk: &JsonWebKey) -> Result<String, KeyConsumerError> {
    if jwk.kty != "RSA" {
        return Err(KeyConsumerError::UnsupportedKeyType(jwk.kty.clone()));
    }
    let n = decode_component(&jwk.n, "n")?;
    let e = decode_component(&jwk.e, "e")?;
    let public_key = RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
        .map_err(|e| KeyConsumerError::Malformed(e.to_string()))?;
    public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyConsumerError::Malformed(e.to_string()))
}

fn decode_component(value: &str, name: &str) -> Result<Vec<u8>, KeyConsumerError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| KeyConsumerError::Malformed(format!("{name}: {e}")))?;
    if bytes.is_empty() {
        return Err(KeyConsumerError::Malformed(format!("{name} is empty")));
    }
    Ok(bytes)
}

fn decoding_key_from_pem(pem: &str) -> Result<DecodingKey, KeyConsumerError> {
    DecodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|e| KeyConsumerError::Malformed(e.to_string()))
}

/// Write `pem` next to `path` and rename it into place, so readers see
/// either the old file or the new one, never a partial write.
pub async fn save_key_to_file(path: &Path, pem: &str) -> Result<(), KeyConsumerError> {
    let io_err = |source: std::io::Error| KeyConsumerError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "key.pem".to_string());
    let tmp = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    tokio::fs::write(&tmp, pem).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    Ok(())
}
