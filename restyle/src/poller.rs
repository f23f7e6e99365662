//! Result poller: turns a job token into an artifact URL.
//!
//! Fixed-attempt polling. The attempt count is `timeout / interval`, decided
//! once up front. Every attempt sleeps first and probes second, so nothing is
//! probed at tick 0. Slow probes stretch real elapsed time past `timeout`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::JobError;
use crate::job::JobToken;
use crate::predictor::StatusSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Must be non-zero; `Config` rejects a zero `POLL_INTERVAL_MS`.
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3000),
            timeout: Duration::from_millis(180_000),
        }
    }
}

impl PollConfig {
    /// Planned number of status probes. Always at least one.
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        let attempts = self.timeout.as_millis() / interval;
        attempts.clamp(1, u32::MAX as u128) as u32
    }
}

/// Waits between probes.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct ResultPoller {
    config: PollConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl ResultPoller {
    pub fn new(config: PollConfig) -> Self {
        Self::with_sleeper(config, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(config: PollConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { config, sleeper }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Poll until success, error, or the attempt budget runs out.
    pub async fn run<S>(&self, source: &S, token: &JobToken) -> Result<String, JobError>
    where
        S: StatusSource + ?Sized,
    {
        let max_attempts = self.config.max_attempts();

        for attempt in 1..=max_attempts {
            self.sleeper.sleep(self.config.interval).await;

            let report = match source.status(token).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(
                        %token,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Status check failed, counting as pending"
                    );
                    continue;
                }
            };

            let status = report.status();
            if status.is_success() {
                tracing::info!(%token, attempt, max_attempts, status = status.as_str(), "Prediction succeeded");
                return match report.artifact_url() {
                    Some(url) => Ok(url),
                    None => {
                        tracing::error!(%token, payload = %report.payload(), "Prediction succeeded without usable output");
                        Err(JobError::PredictionFailed(report.into_payload()))
                    }
                };
            }

            if status.is_error() {
                tracing::warn!(%token, attempt, max_attempts, status = status.as_str(), "Prediction failed");
                return Err(JobError::PredictionFailed(report.into_payload()));
            }

            tracing::debug!(
                %token,
                attempt,
                max_attempts,
                status = report.raw_status(),
                "Prediction pending"
            );
        }

        tracing::warn!(%token, max_attempts, "Prediction polling timed out");
        Err(JobError::PollTimeout {
            attempts: max_attempts,
        })
    }
}
