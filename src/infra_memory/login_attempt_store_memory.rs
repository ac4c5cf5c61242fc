use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
pub struct InMemoryLoginAttemptStore {
    attempts: DashMap<UserId, (u32, Instant)>,
}

impl InMemoryLoginAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop counters whose window has lapsed. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.attempts.len();
        self.attempts.retain(|_, e| now < e.1);
        before.saturating_sub(self.attempts.len())
    }
}

fn snapshot(count: u32, expires_at: Instant, now: Instant) -> FailedAttempts {
    FailedAttempts {
        count,
        retry_after_secs: expires_at.saturating_duration_since(now).as_secs().max(1),
    }
}

#[async_trait::async_trait]
impl LoginAttemptStore for InMemoryLoginAttemptStore {
    async fn current(&self, user_id: UserId) -> Result<Option<FailedAttempts>, AuthError> {
        let now = Instant::now();
        let found = self
            .attempts
            .get(&user_id)
            .filter(|e| now < e.1)
            .map(|e| snapshot(e.0, e.1, now));
        if found.is_none() {
            self.attempts.remove_if(&user_id, |_, e| now >= e.1);
        }
        Ok(found)
    }

    async fn record_failure(
        &self,
        user_id: UserId,
        window: Duration,
        max_attempts: u32,
    ) -> Result<FailedAttempts, AuthError> {
        let now = Instant::now();
        let mut entry = self.attempts.entry(user_id).or_insert((0, now + window));
        if now >= entry.1 {
            *entry = (0, now + window);
        }
        entry.0 += 1;
        if entry.0 >= max_attempts {
            entry.1 = now + window;
        }
        Ok(snapshot(entry.0, entry.1, now))
    }

    async fn clear(&self, user_id: UserId) -> Result<(), AuthError> {
        self.attempts.remove(&user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_failures_until_cleared() {
        let store = InMemoryLoginAttemptStore::new();
        let user = UserId::new_random();
        let window = Duration::from_secs(60);

        assert_eq!(store.current(user).await.unwrap(), None);
        store.record_failure(user, window, 3).await.unwrap();
        let second = store.record_failure(user, window, 3).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(store.current(user).await.unwrap().map(|a| a.count), Some(2));

        store.clear(user).await.unwrap();
        assert_eq!(store.current(user).await.unwrap(), None);
    }

    #[tokio::test]
    async fn window_lapses() {
        let store = InMemoryLoginAttemptStore::new();
        let user = UserId::new_random();
        store
            .record_failure(user, Duration::from_millis(20), 5)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.current(user).await.unwrap(), None);
        let fresh = store
            .record_failure(user, Duration::from_millis(20), 5)
            .await
            .unwrap();
        assert_eq!(fresh.count, 1);
    }

    #[tokio::test]
    async fn purge_drops_lapsed_windows() {
        let store = InMemoryLoginAttemptStore::new();
        for _ in 0..100 {
            store
                .record_failure(UserId::new_random(), Duration::from_millis(5), 5)
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        let active = UserId::new_random();
        store
            .record_failure(active, Duration::from_secs(60), 5)
            .await
            .unwrap();

        assert_eq!(store.purge_expired(), 100);
        assert_eq!(store.attempts.len(), 1);
        assert_eq!(store.current(active).await.unwrap().map(|a| a.count), Some(1));
    }
}
