use super::token_issuer::TokenIssuer;
use super::token_validator::TokenValidator;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Checked against the presented password when the login matches no usable
/// account, so a miss pays the same hashing cost as a wrong password. Uses
/// the default Argon2id parameters of [`super::Argon2PasswordHasher`].
const DUMMY_PASSWORD_HASH: &str = concat!(
    "$argon2id$v=19$m=19456,t=2,p=1$E1PGZgJejlYrRTU3OV9bQw",
    "$xSdrQ5u6qqXxgJqvDtBpLsyBlIdGLkuSZKVQP/oar5s",
);

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub window: Duration,
}

pub struct RealAuthService {
    credential_repo: Arc<dyn CredentialRepo>,
    credential_hasher: Arc<dyn CredentialHasher>,
    login_attempts: Arc<dyn LoginAttemptStore>,
    issuer: Arc<TokenIssuer>,
    validator: Arc<TokenValidator>,
    lockout: LockoutPolicy,
    cancel: CancellationToken,
}

impl RealAuthService {
    pub fn new(
        credential_repo: Arc<dyn CredentialRepo>,
        credential_hasher: Arc<dyn CredentialHasher>,
        login_attempts: Arc<dyn LoginAttemptStore>,
        issuer: Arc<TokenIssuer>,
        validator: Arc<TokenValidator>,
        lockout: LockoutPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            credential_repo,
            credential_hasher,
            login_attempts,
            issuer,
            validator,
            lockout,
            cancel,
        }
    }

    fn validate_sign_in(input: &SignInInput) -> Result<(), AuthError> {
        if input.login.trim().is_empty() {
            return Err(AuthError::Validation("login is required".to_string()));
        }
        if input.password.is_empty() {
            return Err(AuthError::Validation("password is required".to_string()));
        }
        Ok(())
    }

    async fn verify_against_dummy(&self, password: &str) {
        if let Err(e) = self
            .credential_hasher
            .verify_password(password, DUMMY_PASSWORD_HASH)
            .await
        {
            warn!(error = %e, "dummy password check failed");
        }
    }

    async fn ensure_owner(&self, caller: UserId, refresh_token: &str) -> Result<(), AuthError> {
        let session = self
            .validator
            .validate_and_decrypt_refresh_token(refresh_token)
            .await?;
        if session.user_id != caller {
            warn!(%caller, owner = %session.user_id, "refresh token presented by another user");
            return Err(AuthError::SecurityToken("invalid or expired"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn sign_in(&self, input: SignInInput) -> Result<IssuedTokens, AuthError> {
        Self::validate_sign_in(&input)?;
        let SignInInput { login, password } = input;
        let login = login.trim();

        let Some(rec) = self.credential_repo.get_by_login(login).await? else {
            info!(login, "sign-in for unknown login");
            self.verify_against_dummy(&password).await;
            return Err(AuthError::InvalidCredentials);
        };
        if !rec.is_active {
            info!(user_id = %rec.user_id, "sign-in for inactive account");
            self.verify_against_dummy(&password).await;
            return Err(AuthError::InvalidCredentials);
        }

        if let Some(attempts) = self.login_attempts.current(rec.user_id).await? {
            if attempts.count >= self.lockout.max_failed_attempts {
                warn!(user_id = %rec.user_id, "sign-in while locked out");
                return Err(AuthError::AccountLocked {
                    retry_after_secs: attempts.retry_after_secs,
                });
            }
        }

        let ok = self
            .credential_hasher
            .verify_password(&password, &rec.password_hash)
            .await?;
        if !ok {
            let attempts = self
                .login_attempts
                .record_failure(
                    rec.user_id,
                    self.lockout.window,
                    self.lockout.max_failed_attempts,
                )
                .await?;
            warn!(user_id = %rec.user_id, failures = attempts.count, "wrong password");
            if attempts.count >= self.lockout.max_failed_attempts {
                return Err(AuthError::AccountLocked {
                    retry_after_secs: attempts.retry_after_secs,
                });
            }
            return Err(AuthError::InvalidCredentials);
        }

        self.login_attempts.clear(rec.user_id).await?;
        self.issuer.generate_tokens(rec.user_id, None).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, AuthError> {
        self.issuer.refresh_tokens(refresh_token).await
    }

    async fn logout(&self, caller: UserId, refresh_token: &str) -> Result<(), AuthError> {
        self.ensure_owner(caller, refresh_token).await?;
        self.issuer.logout_device(refresh_token).await
    }

    async fn logout_all(&self, caller: UserId, refresh_token: &str) -> Result<u64, AuthError> {
        self.ensure_owner(caller, refresh_token).await?;
        let cancel = self.cancel.child_token();
        self.issuer.logout_all_devices(refresh_token, &cancel).await
    }

    async fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.validator.validate_access_token(token).await
    }
}
