use super::signing_key_provider::SigningKeyProvider;
use crate::domain_model::*;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct KeyDistributorConfig {
    pub key_type: String,
    pub public_key_use: String,
    pub algorithm: String,
}

/// Publishes the issuer's public key as a single-entry JWKS.
pub struct KeyDistributor {
    cfg: KeyDistributorConfig,
    keys: Arc<SigningKeyProvider>,
}

impl KeyDistributor {
    pub fn new(cfg: KeyDistributorConfig, keys: Arc<SigningKeyProvider>) -> Self {
        Self { cfg, keys }
    }

    pub fn jwks(&self) -> JsonWebKeySet {
        let (n, e) = self.keys.public_components();
        JsonWebKeySet {
            keys: vec![JsonWebKey {
                kty: self.cfg.key_type.clone(),
                key_use: self.cfg.public_key_use.clone(),
                kid: self.keys.key_id().to_string(),
                alg: self.cfg.algorithm.clone(),
                n: URL_SAFE_NO_PAD.encode(n),
                e: URL_SAFE_NO_PAD.encode(e),
            }],
        }
    }
}
