use crate::domain_model::{AccessClaims, DeviceId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account locked, retry after {retry_after_secs}s")]
    AccountLocked { retry_after_secs: u64 },
    #[error("integrity check failed")]
    Integrity,
    #[error("security token error: {0}")]
    SecurityToken(&'static str),
    #[error("token invalid")]
    TokenInvalid,
    #[error("token signature invalid")]
    SignatureInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("verification key unavailable")]
    KeyUnavailable { has_cached_key: bool },
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Clone)]
pub struct SignInInput {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for SignInInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInInput")
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AccessToken(pub String);

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Base64 ciphertext of a refresh token. This is the bearer credential itself.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedRefreshToken(pub String);

impl fmt::Debug for EncryptedRefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptedRefreshToken(..)")
    }
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub access_token: AccessToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: EncryptedRefreshToken,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Check credentials and open a new device session.
    async fn sign_in(&self, input: SignInInput) -> Result<IssuedTokens, AuthError>;
    /// Exchange a refresh token for a new pair. The presented token is consumed.
    async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, AuthError>;
    /// Revoke the device session behind `refresh_token`, which must belong
    /// to `caller`.
    async fn logout(&self, caller: UserId, refresh_token: &str) -> Result<(), AuthError>;
    /// Revoke every device session of `caller`.
    async fn logout_all(&self, caller: UserId, refresh_token: &str) -> Result<u64, AuthError>;
    async fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError>;
}
