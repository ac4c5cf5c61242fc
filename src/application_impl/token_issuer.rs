use super::authenticated_cipher::AuthenticatedCipher;
use super::signing_key_provider::SigningKeyProvider;
use super::token_validator::TokenValidator;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zeroize::Zeroizing;

pub(crate) const TOKEN_SEPARATOR: char = '|';
const REFRESH_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct TokenIssuerConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// Mints access/refresh token pairs and owns the refresh-token lifecycle:
/// rotation, device logout and logout everywhere.
pub struct TokenIssuer {
    cfg: TokenIssuerConfig,
    keys: Arc<SigningKeyProvider>,
    cipher: Arc<AuthenticatedCipher>,
    session_store: Arc<dyn SessionStore>,
    validator: Arc<TokenValidator>,
}

impl TokenIssuer {
    pub fn new(
        cfg: TokenIssuerConfig,
        keys: Arc<SigningKeyProvider>,
        cipher: Arc<AuthenticatedCipher>,
        session_store: Arc<dyn SessionStore>,
        validator: Arc<TokenValidator>,
    ) -> Self {
        Self {
            cfg,
            keys,
            cipher,
            session_store,
            validator,
        }
    }

    /// Issue a token pair. `device_id` is `None` for a new session and the
    /// existing device when rotating.
    pub async fn generate_tokens(
        &self,
        user_id: UserId,
        device_id: Option<DeviceId>,
    ) -> Result<IssuedTokens, AuthError> {
        let device_id = device_id.unwrap_or_else(DeviceId::new_random);
        let (access_token, access_token_expires_at) =
            self.generate_access_token(user_id, device_id)?;
        let (refresh_token, refresh_token_expires_at) = self
            .generate_encrypted_refresh_token(user_id, device_id)
            .await?;

        info!(%user_id, %device_id, "issued token pair");

        Ok(IssuedTokens {
            user_id,
            device_id,
            access_token,
            access_token_expires_at,
            refresh_token,
            refresh_token_expires_at,
        })
    }

    pub fn generate_access_token(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError> {
        let iat = Utc::now();
        let exp = iat + self.cfg.access_ttl;
        let claims = AccessClaims {
            sub: user_id,
            jti: uuid::Uuid::new_v4().to_string(),
            device: device_id,
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
            iat: iat.timestamp(),
            exp: exp.timestamp(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.keys.key_id().to_string());
        let encoding_key = self
            .keys
            .encoding_key()
            .map_err(|e| AuthError::InternalError(e.to_string()))?;
        let token = encode(&header, &claims, &encoding_key)
            .map_err(|e| AuthError::InternalError(e.to_string()))?;

        Ok((AccessToken(token), exp))
    }

    /// Seal `secret|user|device`, record the ciphertext as the device's live
    /// refresh token and hand the ciphertext back as the bearer credential.
    pub async fn generate_encrypted_refresh_token(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> Result<(EncryptedRefreshToken, DateTime<Utc>), AuthError> {
        let mut secret = Zeroizing::new([0u8; REFRESH_SECRET_LEN]);
        OsRng.fill_bytes(secret.as_mut());
        let plain = Zeroizing::new(format!(
            "{}{TOKEN_SEPARATOR}{user_id}{TOKEN_SEPARATOR}{device_id}",
            STANDARD.encode(secret.as_ref())
        ));
        let sealed = self.cipher.encrypt(&plain)?;

        let expires_at = Utc::now() + self.cfg.refresh_ttl;
        self.session_store
            .set(
                &SessionKey::refresh(user_id, device_id),
                &sealed,
                self.cfg.refresh_ttl,
            )
            .await?;

        Ok((EncryptedRefreshToken(sealed), expires_at))
    }

    /// Rotate both tokens. The presented refresh token is consumed with a
    /// compare-and-delete, so of two concurrent refreshes with the same token
    /// exactly one succeeds.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<IssuedTokens, AuthError> {
        let session = self
            .validator
            .validate_and_decrypt_refresh_token(refresh_token)
            .await?;

        let consumed = self
            .session_store
            .compare_and_delete(&session.key, &session.token)
            .await?;
        if !consumed {
            warn!(
                user_id = %session.user_id,
                device_id = %session.device_id,
                "refresh token lost a concurrent rotation"
            );
            return Err(AuthError::SecurityToken("invalid or expired"));
        }

        self.generate_tokens(session.user_id, Some(session.device_id))
            .await
    }

    pub async fn logout_device(&self, refresh_token: &str) -> Result<(), AuthError> {
        let session = self
            .validator
            .validate_and_decrypt_refresh_token(refresh_token)
            .await?;
        self.session_store.delete(&session.key).await?;
        info!(user_id = %session.user_id, device_id = %session.device_id, "device logged out");
        Ok(())
    }

    /// Any live refresh token of the user proves identity; every device
    /// session of that user is then revoked.
    pub async fn logout_all_devices(
        &self,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, AuthError> {
        let session = self
            .validator
            .validate_and_decrypt_refresh_token(refresh_token)
            .await?;
        let removed = self
            .session_store
            .delete_all_matching(session.user_id, cancel)
            .await?;
        info!(user_id = %session.user_id, removed, "all devices logged out");
        Ok(removed)
    }
}
