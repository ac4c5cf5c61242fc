use crate::application_impl::{KeyConsumer, RefreshOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct KeyRefreshPolicy {
    /// Delay between scheduled refreshes while the key service is healthy.
    pub interval: Duration,
    /// First retry delay after a failed refresh, doubled per failure.
    pub retry_initial: Duration,
    pub retry_max: Duration,
}

/// Keeps the verifier's public key current.
///
/// Wakes on a schedule or when [`KeyConsumer::request_refresh`] is called.
/// Failures back off exponentially and never stop the loop; the consumer
/// keeps serving its last good key meanwhile.
pub struct KeyRefreshWorker {
    consumer: Arc<KeyConsumer>,
    policy: KeyRefreshPolicy,
    cancellation_token: CancellationToken,
}

impl KeyRefreshWorker {
    pub fn new(
        consumer: Arc<KeyConsumer>,
        policy: KeyRefreshPolicy,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            consumer,
            policy,
            cancellation_token,
        }
    }

    fn next_backoff(&self, current: Option<Duration>) -> Duration {
        match current {
            None => self.policy.retry_initial,
            Some(d) => (d * 2).min(self.policy.retry_max),
        }
    }

    pub async fn run(&self) {
        let mut backoff: Option<Duration> = None;
        // A cold start without any key retries on the failure schedule.
        let first_delay = if self.consumer.has_key().await {
            self.policy.interval
        } else {
            self.policy.retry_initial
        };
        let mut next_due = Instant::now() + first_delay;
        let mut last_attempt: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("key refresh worker shutting down...");
                    break;
                }
                _ = tokio::time::sleep_until(next_due) => {
                    tracing::debug!("scheduled key refresh");
                }
                _ = self.consumer.refresh_requested() => {
                    // Bursts of rejected signatures must not turn into a
                    // fetch per request.
                    if last_attempt.is_some_and(|t| t.elapsed() < self.policy.retry_initial) {
                        tracing::debug!("key refresh requested during cooldown, ignored");
                        continue;
                    }
                    tracing::info!("on-demand key refresh");
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("key refresh worker shutting down...");
                    break;
                }
                outcome = self.consumer.refresh_with_fallback() => outcome,
            };
            last_attempt = Some(Instant::now());

            let delay = match outcome {
                RefreshOutcome::Refreshed => {
                    backoff = None;
                    self.policy.interval
                }
                RefreshOutcome::KeptCached | RefreshOutcome::NoKey => {
                    let delay = self.next_backoff(backoff);
                    backoff = Some(delay);
                    tracing::warn!(?outcome, retry_in = ?delay, "key refresh failed");
                    delay
                }
            };
            next_due = Instant::now() + delay;
        }
    }
}
