use crate::application_port::AuthError;
use crate::domain_model::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("infra error: {0}")]
    Store(String),
    #[error("scan cancelled")]
    Cancelled,
}

impl From<SessionStoreError> for AuthError {
    fn from(error: SessionStoreError) -> Self {
        match error {
            SessionStoreError::Store(e) => AuthError::Store(e),
            SessionStoreError::Cancelled => AuthError::Store("operation cancelled".to_string()),
        }
    }
}

/// Key-value storage of refresh-token records with per-key TTL.
///
/// Each `(user, device)` pair owns at most one record; `set` on an existing
/// key replaces it.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn set(
        &self,
        key: &SessionKey,
        value: &str,
        ttl: Duration,
    ) -> Result<(), SessionStoreError>;

    async fn get(&self, key: &SessionKey) -> Result<Option<String>, SessionStoreError>;

    async fn exists(&self, key: &SessionKey) -> Result<bool, SessionStoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, key: &SessionKey) -> Result<bool, SessionStoreError>;

    /// Remove the record only if it still holds `expected`. Returns whether it did.
    async fn compare_and_delete(
        &self,
        key: &SessionKey,
        expected: &str,
    ) -> Result<bool, SessionStoreError>;

    /// Remove every refresh record of `user_id`, whatever the device.
    ///
    /// Cancellation is checked between scan iterations; nothing is deleted
    /// when the scan is cancelled, so the call can simply be re-run.
    async fn delete_all_matching(
        &self,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<u64, SessionStoreError>;
}
