use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;

const RECORD_LOGIN_FAILURE: &str = include_str!("record_login_failure.lua");

pub struct RedisLoginAttemptStore {
    conn: ConnectionManager,
    prefix: String,
    record_failure: Script,
}

impl RedisLoginAttemptStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisLoginAttemptStore {
            conn,
            prefix: prefix.into(),
            record_failure: Script::new(RECORD_LOGIN_FAILURE),
        }
    }

    fn key(&self, user_id: UserId) -> String {
        format!("{}:{}", self.prefix, user_id)
    }
}

#[async_trait::async_trait]
impl LoginAttemptStore for RedisLoginAttemptStore {
    async fn current(&self, user_id: UserId) -> Result<Option<FailedAttempts>, AuthError> {
        let key = self.key(user_id);
        let mut conn = self.conn.clone();
        let (count, ttl): (Option<u32>, i64) = redis::pipe()
            .get(&key)
            .ttl(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(count.map(|count| FailedAttempts {
            count,
            retry_after_secs: ttl.max(1) as u64,
        }))
    }

    async fn record_failure(
        &self,
        user_id: UserId,
        window: Duration,
        max_attempts: u32,
    ) -> Result<FailedAttempts, AuthError> {
        let key = self.key(user_id);
        let mut conn = self.conn.clone();
        let (count, ttl): (u32, i64) = self
            .record_failure
            .key(&key)
            .arg(window.as_secs().max(1))
            .arg(max_attempts)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(FailedAttempts {
            count,
            retry_after_secs: ttl.max(1) as u64,
        })
    }

    async fn clear(&self, user_id: UserId) -> Result<(), AuthError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(self.key(user_id))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Live Redis from `REDIS_URL`. Tests return early when it is unset.
    async fn store() -> Option<RedisLoginAttemptStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        let client = redis::Client::open(url).unwrap();
        let conn = client.get_connection_manager().await.unwrap();
        Some(RedisLoginAttemptStore::new(conn, "test_login_failures"))
    }

    #[tokio::test]
    async fn failures_count_up_within_the_window() {
        let Some(store) = store().await else {
            return;
        };
        let user = UserId::new_random();
        let window = Duration::from_secs(60);

        assert_eq!(store.current(user).await.unwrap(), None);
        let first = store.record_failure(user, window, 3).await.unwrap();
        assert_eq!(first.count, 1);
        assert!((1..=60).contains(&first.retry_after_secs));

        store.record_failure(user, window, 3).await.unwrap();
        let third = store.record_failure(user, window, 3).await.unwrap();
        assert_eq!(third.count, 3);
        assert!((1..=60).contains(&third.retry_after_secs));

        let current = store.current(user).await.unwrap().unwrap();
        assert_eq!(current.count, 3);
        assert!(current.retry_after_secs <= 60);

        store.clear(user).await.unwrap();
        assert_eq!(store.current(user).await.unwrap(), None);
    }

    #[tokio::test]
    async fn counter_expires_with_its_window() {
        let Some(store) = store().await else {
            return;
        };
        let user = UserId::new_random();
        store
            .record_failure(user, Duration::from_secs(1), 5)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(store.current(user).await.unwrap(), None);
    }
}
