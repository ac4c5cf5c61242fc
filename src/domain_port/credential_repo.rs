use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub user_id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait CredentialRepo: Send + Sync {
    /// Fetch credentials by username, or by email when `login` contains `@`.
    async fn get_by_login(&self, login: &str) -> Result<Option<CredentialRecord>, AuthError>;
}

pub(crate) fn is_email_login(login: &str) -> bool {
    login.contains('@')
}
