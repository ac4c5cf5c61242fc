use super::{DeviceId, UserId};
use std::fmt;

const REFRESH_NAMESPACE: &str = "refresh";

/// Store key of the refresh-token record for one `(user, device)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn refresh(user_id: UserId, device_id: DeviceId) -> Self {
        SessionKey(format!("{REFRESH_NAMESPACE}:{user_id}:{device_id}"))
    }

    /// Glob pattern matching every refresh record of `user_id`.
    pub fn refresh_pattern(user_id: UserId) -> String {
        format!("{REFRESH_NAMESPACE}:{user_id}:*")
    }

    /// Prefix shared by every refresh record of `user_id`.
    pub fn refresh_prefix(user_id: UserId) -> String {
        format!("{REFRESH_NAMESPACE}:{user_id}:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
