use crate::infra_memory::{InMemoryLoginAttemptStore, InMemorySessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Periodically drops expired records from the in-process stores, which
/// otherwise only forget a record when its exact key is touched again.
pub struct MemorySweeper {
    sessions: Arc<InMemorySessionStore>,
    login_attempts: Arc<InMemoryLoginAttemptStore>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl MemorySweeper {
    pub fn new(
        sessions: Arc<InMemorySessionStore>,
        login_attempts: Arc<InMemoryLoginAttemptStore>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            sessions,
            login_attempts,
            interval,
            cancellation_token,
        }
    }

    /// Returns the number of dropped sessions and login-failure counters.
    pub fn sweep_once(&self) -> (usize, usize) {
        (
            self.sessions.purge_expired(),
            self.login_attempts.purge_expired(),
        )
    }

    pub async fn run(&self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("memory sweeper shutting down...");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            let (sessions, login_attempts) = self.sweep_once();
            if sessions + login_attempts > 0 {
                tracing::debug!(sessions, login_attempts, "expired in-memory records dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::*;
    use crate::domain_port::*;

    async fn stores_with_expired_records()
    -> (Arc<InMemorySessionStore>, Arc<InMemoryLoginAttemptStore>) {
        let sessions = Arc::new(InMemorySessionStore::new());
        let login_attempts = Arc::new(InMemoryLoginAttemptStore::new());
        let user = UserId::new_random();
        for _ in 0..5 {
            let key = SessionKey::refresh(user, DeviceId::new_random());
            sessions
                .set(&key, "v", Duration::from_millis(1))
                .await
                .unwrap();
        }
        login_attempts
            .record_failure(user, Duration::from_millis(1), 5)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        (sessions, login_attempts)
    }

    #[tokio::test]
    async fn sweep_once_reports_what_it_dropped() {
        let (sessions, login_attempts) = stores_with_expired_records().await;
        let sweeper = MemorySweeper::new(
            sessions,
            login_attempts,
            Duration::from_secs(60),
            CancellationToken::new(),
        );
        assert_eq!(sweeper.sweep_once(), (5, 1));
        assert_eq!(sweeper.sweep_once(), (0, 0));
    }

    #[tokio::test]
    async fn sweeps_on_schedule_and_stops_on_cancel() {
        let (sessions, login_attempts) = stores_with_expired_records().await;
        let cancel = CancellationToken::new();
        let sweeper = MemorySweeper::new(
            sessions.clone(),
            login_attempts.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        );
        let handle = tokio::spawn(async move { sweeper.run().await });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sessions.purge_expired(), 0);
        assert_eq!(login_attempts.purge_expired(), 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
