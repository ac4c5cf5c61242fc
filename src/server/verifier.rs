use super::key_refresh_worker::*;
use crate::application_impl::*;
use crate::logger::*;
use crate::settings::VerifierSettings;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A service that trusts the issuer's tokens without holding its private key.
pub struct VerifierServer {
    pub access_validator: Arc<AccessTokenValidator>,
    pub key_consumer: Arc<KeyConsumer>,
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl VerifierServer {
    pub async fn try_new(settings: &VerifierSettings) -> anyhow::Result<Self> {
        let kc = &settings.key_consumer;
        let key_consumer = Arc::new(KeyConsumer::new(KeyConsumerConfig {
            key_service_url: kc.key_service_url.clone(),
            local_key_path: PathBuf::from(&kc.local_key_path),
            fetch_timeout: Duration::from_secs(kc.fetch_timeout_secs),
        })?);

        // Start even when the issuer is down; requests answer 503 until a
        // key arrives.
        if let Err(e) = key_consumer.get_signing_key().await {
            warn!(error = %e, "starting without a verification key");
        }

        let access_validator = Arc::new(AccessTokenValidator::new(
            key_consumer.clone(),
            &settings.jwt.issuer,
            &settings.jwt.audience,
        ));

        let cancel = CancellationToken::new();
        let worker = KeyRefreshWorker::new(
            key_consumer.clone(),
            KeyRefreshPolicy {
                interval: Duration::from_secs(kc.refresh_hours * 60 * 60),
                retry_initial: Duration::from_secs(kc.retry_initial_secs),
                retry_max: Duration::from_secs(kc.retry_max_secs),
            },
            cancel.clone(),
        );
        let refresh_handle = tokio::spawn(async move {
            worker.run().await;
        });

        info!("verifier started");

        Ok(Self {
            access_validator,
            key_consumer,
            refresh_handle: Mutex::new(Some(refresh_handle)),
            cancel,
        })
    }

    pub async fn shutdown(&self) {
        info!("verifier shutting down...");

        self.cancel.cancel();

        let handle = self.refresh_handle.lock().ok().and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("key refresh handle dropped: {:?}", r);
        }
    }
}
