use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::UserId;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use chrono::Utc;
use sqlx::{MySql, Pool};
use super::memory_sweeper::MemorySweeper;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const LOGIN_FAILURE_PREFIX: &str = "login_failures";
const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The issuing service: signs access tokens, manages refresh sessions and
/// publishes its public key.
pub struct IssuerServer {
    pub auth_service: Arc<dyn AuthService>,
    pub access_validator: Arc<AccessTokenValidator>,
    pub key_distributor: Arc<KeyDistributor>,
    cipher: Arc<AuthenticatedCipher>,
    cancel: CancellationToken,
    pool: Option<Pool<MySql>>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl IssuerServer {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let jwt = &settings.jwt;

        // Key material problems are fatal: nothing is served half-configured.
        let keys = Arc::new(
            SigningKeyProvider::load(
                &jwt.rsa_private_key_path,
                &jwt.rsa_public_key_path,
                jwt.key_id.clone(),
            )
            .await?,
        );
        let cipher = Arc::new(
            AuthenticatedCipher::from_base64(
                settings.encryption.key.expose(),
                settings.encryption.hmac_key.expose(),
            )
            .map_err(|e| anyhow::anyhow!("encryption keys: {e}"))?,
        );
        info!(key_id = %jwt.key_id, "signing keys loaded");

        let cancel = CancellationToken::new();
        let mut sweep_handle = None;
        let session_store: Arc<dyn SessionStore>;
        let login_attempts: Arc<dyn LoginAttemptStore>;
        match settings.session.backend.as_str() {
            "memory" => {
                let sessions = Arc::new(InMemorySessionStore::new());
                let attempts = Arc::new(InMemoryLoginAttemptStore::new());
                let sweeper = MemorySweeper::new(
                    sessions.clone(),
                    attempts.clone(),
                    MEMORY_SWEEP_INTERVAL,
                    cancel.clone(),
                );
                sweep_handle = Some(tokio::spawn(async move {
                    sweeper.run().await;
                }));
                session_store = sessions;
                login_attempts = attempts;
            }
            "redis" => {
                let url = settings
                    .session
                    .redis_url
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("session.redis_url is required"))?;
                let redis_client = redis::Client::open(url.expose())?;
                let redis_manager = redis_client.get_connection_manager().await?;
                session_store = Arc::new(RedisSessionStore::new(redis_manager.clone()));
                login_attempts = Arc::new(RedisLoginAttemptStore::new(
                    redis_manager,
                    LOGIN_FAILURE_PREFIX,
                ));
            }
            other => return Err(anyhow::anyhow!("Unknown session backend: {}", other)),
        }

        let mut pool = None;
        let credential_repo: Arc<dyn CredentialRepo> = match settings.credentials.backend.as_str()
        {
            "memory" => {
                let now = Utc::now();
                let records = settings
                    .credentials
                    .users
                    .iter()
                    .map(|u| CredentialRecord {
                        user_id: UserId(u.user_id),
                        username: u.username.clone(),
                        email: u.email.clone(),
                        password_hash: u.password_hash.clone(),
                        is_active: u.is_active,
                        created_at: now,
                    })
                    .collect::<Vec<_>>();
                info!(users = records.len(), "in-memory credentials seeded");
                Arc::new(InMemoryCredentialRepo::new(records))
            }
            "mysql" => {
                let url = settings
                    .credentials
                    .mysql_url
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("credentials.mysql_url is required"))?;
                let mysql = Pool::<MySql>::connect(url.expose()).await?;
                pool = Some(mysql.clone());
                Arc::new(MySqlCredentialRepo::new(mysql))
            }
            other => return Err(anyhow::anyhow!("Unknown credentials backend: {}", other)),
        };

        let access_validator = Arc::new(AccessTokenValidator::new(
            keys.clone(),
            &jwt.issuer,
            &jwt.audience,
        ));
        let validator = Arc::new(TokenValidator::new(
            access_validator.clone(),
            cipher.clone(),
            session_store.clone(),
        ));
        let issuer = Arc::new(TokenIssuer::new(
            TokenIssuerConfig {
                issuer: jwt.issuer.clone(),
                audience: jwt.audience.clone(),
                access_ttl: Duration::from_secs(jwt.access_token_minutes * 60),
                refresh_ttl: Duration::from_secs(jwt.refresh_token_days * 24 * 60 * 60),
            },
            keys.clone(),
            cipher.clone(),
            session_store,
            validator.clone(),
        ));
        let key_distributor = Arc::new(KeyDistributor::new(
            KeyDistributorConfig {
                key_type: jwt.key_type.clone(),
                public_key_use: jwt.public_key_use.clone(),
                algorithm: jwt.algorithm.clone(),
            },
            keys,
        ));

        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            credential_repo,
            Arc::new(Argon2PasswordHasher),
            login_attempts,
            issuer,
            validator,
            LockoutPolicy {
                max_failed_attempts: settings.lockout.max_failed_attempts,
                window: Duration::from_secs(settings.lockout.lockout_minutes * 60),
            },
            cancel.clone(),
        ));

        info!("issuer started");

        Ok(Self {
            auth_service,
            access_validator,
            key_distributor,
            cipher,
            cancel,
            pool,
            sweep_handle: Mutex::new(sweep_handle),
        })
    }

    pub async fn shutdown(&self) {
        info!("issuer shutting down...");

        self.cancel.cancel();
        let handle = self.sweep_handle.lock().ok().and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("memory sweeper handle dropped: {:?}", r);
        }
        self.cipher.dispose();
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
