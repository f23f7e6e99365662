//! Job orchestrator: drives one transformation request end to end.
//!
//! Flow:
//! 1. Validate prompt and image payload
//! 2. Normalize the image and upload it
//! 3. Submit to the predictor
//! 4. Poll for the result
//! 5. Record the outcome, publish a snapshot in the background
//!
//! Nothing here is retried. The snapshot publish is the only step whose
//! failure never reaches the caller.

use std::sync::Arc;

use tracing::Instrument;

use crate::error::JobError;
use crate::job::{JobOutcome, JobRequest, JobSubmission};
use crate::normalize::ImageNormalizer;
use crate::poller::{PollConfig, ResultPoller};
use crate::predictor::Predictor;
use crate::publish::{NoopPublisher, SnapshotPublisher, snapshot_path};
use crate::store::SessionStore;
use crate::upload::ObjectStore;

pub const DEFAULT_SNAPSHOT_DIR: &str = "results";

pub struct JobOrchestrator {
    predictor: Arc<dyn Predictor>,
    normalizer: Arc<dyn ImageNormalizer>,
    object_store: Arc<dyn ObjectStore>,
    store: Arc<dyn SessionStore>,
    poller: ResultPoller,
    publisher: Arc<dyn SnapshotPublisher>,
    snapshot_dir: String,
}

impl JobOrchestrator {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        normalizer: Arc<dyn ImageNormalizer>,
        object_store: Arc<dyn ObjectStore>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            predictor,
            normalizer,
            object_store,
            store,
            poller: ResultPoller::new(PollConfig::default()),
            publisher: Arc::new(NoopPublisher),
            snapshot_dir: DEFAULT_SNAPSHOT_DIR.to_string(),
        }
    }

    pub fn with_poller(mut self, poller: ResultPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn SnapshotPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<String>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run one request to completion and return the artifact URL.
    pub async fn run(&self, request: JobRequest) -> Result<String, JobError> {
        let identifier = request.id.clone().unwrap_or_default();
        let span = tracing::info_span!("job", job_id = %identifier);
        self.run_inner(identifier, request).instrument(span).await
    }

    async fn run_inner(&self, identifier: String, request: JobRequest) -> Result<String, JobError> {
        let (prompt, image) = validate(request)?;

        let normalized = self
            .normalizer
            .normalize(&image)
            .await
            .map_err(JobError::into_upstream)?;
        let image_url = self
            .object_store
            .upload(normalized.bytes, normalized.content_type)
            .await
            .map_err(JobError::into_upstream)?;

        let submission = JobSubmission {
            identifier: identifier.clone(),
            prompt,
            image_url,
        };
        let token = self.predictor.submit(&submission).await?;
        tracing::info!(%token, image_url = %submission.image_url, "Prediction submitted");

        let artifact_url = self.poller.run(&*self.predictor, &token).await?;

        let outcome = JobOutcome::completed_now(identifier, submission.prompt, artifact_url.clone());
        if self.store.insert(outcome.clone()).is_some() {
            tracing::debug!("Replaced earlier outcome for identifier");
        }
        tracing::info!(%artifact_url, "Job complete");

        self.spawn_publish(outcome);
        Ok(artifact_url)
    }

    /// Fire and forget. The result is already committed from the caller's view.
    fn spawn_publish(&self, outcome: JobOutcome) {
        let publisher = Arc::clone(&self.publisher);
        let path = snapshot_path(&self.snapshot_dir, &outcome.identifier);
        let message = format!("Add restyle result for {}", outcome.identifier);

        tokio::spawn(
            async move {
                let payload = match serde_json::to_value(&outcome) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to serialize job snapshot");
                        return;
                    }
                };
                if let Err(e) = publisher.publish(&path, &payload, &message).await {
                    tracing::warn!(%path, error = %e, "Snapshot publish failed");
                }
            }
            .in_current_span(),
        );
    }
}

fn validate(request: JobRequest) -> Result<(String, String), JobError> {
    let prompt = request.prompt.filter(|p| !p.trim().is_empty());
    let image = request.image.filter(|i| !i.trim().is_empty());

    match (prompt, image) {
        (Some(prompt), Some(image)) => Ok((prompt, image)),
        (None, None) => Err(JobError::Validation(
            "Both a prompt and an image are required".to_string(),
        )),
        (None, _) => Err(JobError::Validation("A prompt is required".to_string())),
        (_, None) => Err(JobError::Validation("An image is required".to_string())),
    }
}
