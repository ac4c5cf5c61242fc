use crate::application_port::*;
use crate::domain_model::*;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedAttempts {
    pub count: u32,
    pub retry_after_secs: u64,
}

#[async_trait::async_trait]
pub trait LoginAttemptStore: Send + Sync {
    /// Failed attempts inside the current window, if any.
    async fn current(&self, user_id: UserId) -> Result<Option<FailedAttempts>, AuthError>;

    /// Count one failure. The window starts at the first failure and restarts
    /// once `max_attempts` is reached, so a lockout always lasts `window`.
    async fn record_failure(
        &self,
        user_id: UserId,
        window: Duration,
        max_attempts: u32,
    ) -> Result<FailedAttempts, AuthError>;

    async fn clear(&self, user_id: UserId) -> Result<(), AuthError>;
}
