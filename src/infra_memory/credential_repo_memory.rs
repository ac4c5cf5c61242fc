use crate::application_port::*;
use crate::domain_port::*;

/// Fixed credential table, typically seeded from the settings file.
pub struct InMemoryCredentialRepo {
    records: Vec<CredentialRecord>,
}

impl InMemoryCredentialRepo {
    pub fn new(records: Vec<CredentialRecord>) -> Self {
        Self { records }
    }
}

#[async_trait::async_trait]
impl CredentialRepo for InMemoryCredentialRepo {
    async fn get_by_login(&self, login: &str) -> Result<Option<CredentialRecord>, AuthError> {
        let found = if is_email_login(login) {
            self.records.iter().find(|r| {
                r.email
                    .as_deref()
                    .is_some_and(|email| email.eq_ignore_ascii_case(login))
            })
        } else {
            self.records.iter().find(|r| r.username == login)
        };
        Ok(found.cloned())
    }
}
