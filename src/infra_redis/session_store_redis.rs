use crate::domain_model::*;
use crate::domain_port::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const COMPARE_AND_DELETE: &str = include_str!("compare_and_delete.lua");
const SCAN_COUNT: usize = 500;

pub struct RedisSessionStore {
    conn: ConnectionManager,
    compare_and_delete: Script,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager) -> Self {
        RedisSessionStore {
            conn,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
        }
    }

    /// Cursor-walk the keyspace until the cursor wraps to 0, collecting keys
    /// that match `pattern`. `on_page` sees the size of each page. Cancellation
    /// is checked before every SCAN call.
    async fn scan_matching(
        &self,
        pattern: &str,
        cancel: &CancellationToken,
        mut on_page: impl FnMut(usize) + Send,
    ) -> Result<Vec<String>, SessionStoreError> {
        let mut conn = self.conn.clone();
        // SCAN may report a key more than once across iterations.
        let mut matched: HashSet<String> = HashSet::new();
        let mut cursor: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                debug!(pattern, scanned = matched.len(), "session scan cancelled");
                return Err(SessionStoreError::Cancelled);
            }
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| SessionStoreError::Store(e.to_string()))?;
            on_page(keys.len());
            matched.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(matched.into_iter().collect())
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn set(
        &self,
        key: &SessionKey,
        value: &str,
        ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key.as_str(), value, ttl.as_secs().max(1))
            .await
            .map_err(|e| SessionStoreError::Store(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<String>, SessionStoreError> {
        let mut conn = self.conn.clone();
        conn.get(key.as_str())
            .await
            .map_err(|e| SessionStoreError::Store(e.to_string()))
    }

    async fn exists(&self, key: &SessionKey) -> Result<bool, SessionStoreError> {
        let mut conn = self.conn.clone();
        conn.exists(key.as_str())
            .await
            .map_err(|e| SessionStoreError::Store(e.to_string()))
    }

    async fn delete(&self, key: &SessionKey) -> Result<bool, SessionStoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn
            .del(key.as_str())
            .await
            .map_err(|e| SessionStoreError::Store(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn compare_and_delete(
        &self,
        key: &SessionKey,
        expected: &str,
    ) -> Result<bool, SessionStoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = self
            .compare_and_delete
            .key(key.as_str())
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SessionStoreError::Store(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn delete_all_matching(
        &self,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<u64, SessionStoreError> {
        let pattern = SessionKey::refresh_pattern(user_id);
        let keys = self
            .scan_matching(&pattern, cancel, |page| {
                debug!(%user_id, page, "session scan page");
            })
            .await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let removed: u64 = conn
            .del(&keys)
            .await
            .map_err(|e| SessionStoreError::Store(e.to_string()))?;
        Ok(removed)
    }

}
