use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    entries: DashMap<String, Entry>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired record. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    fn live_value(&self, key: &SessionKey) -> Option<String> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key.as_str())
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone());
        if value.is_none() {
            self.entries.remove_if(key.as_str(), |_, e| !e.is_live(now));
        }
        value
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn set(
        &self,
        key: &SessionKey,
        value: &str,
        ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        self.entries.insert(
            key.as_str().to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<String>, SessionStoreError> {
        Ok(self.live_value(key))
    }

    async fn exists(&self, key: &SessionKey) -> Result<bool, SessionStoreError> {
        Ok(self.live_value(key).is_some())
    }

    async fn delete(&self, key: &SessionKey) -> Result<bool, SessionStoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key.as_str())
            .is_some_and(|(_, e)| e.is_live(now)))
    }

    async fn compare_and_delete(
        &self,
        key: &SessionKey,
        expected: &str,
    ) -> Result<bool, SessionStoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(key.as_str(), |_, e| e.is_live(now) && e.value == expected)
            .is_some())
    }

    async fn delete_all_matching(
        &self,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<u64, SessionStoreError> {
        let prefix = SessionKey::refresh_prefix(user_id);
        let mut matched = Vec::new();
        for entry in self.entries.iter() {
            if cancel.is_cancelled() {
                return Err(SessionStoreError::Cancelled);
            }
            if entry.key().starts_with(&prefix) {
                matched.push(entry.key().clone());
            }
        }

        let now = Instant::now();
        let removed = matched
            .iter()
            .filter_map(|k| self.entries.remove(k))
            .filter(|(_, e)| e.is_live(now))
            .count();
        Ok(removed as u64)
    }
}
