//! RestyleService: transport-agnostic entry point for jobs and status.
//!
//! Owns the orchestrator, the status view over the shared session store,
//! and version info. Transports delegate to this service.

use std::sync::Arc;

use anyhow::Context;

use crate::config::Config;
use crate::error::JobError;
use crate::job::JobRequest;
use crate::normalize::PngNormalizer;
use crate::orchestrator::JobOrchestrator;
use crate::poller::ResultPoller;
use crate::predictor::ReplicateClient;
use crate::publish::{GithubPublisher, NoopPublisher, SnapshotPublisher};
use crate::status::{JobStatus, StatusService};
use crate::store::{MemorySessionStore, SessionStore};
use crate::upload::HttpObjectStore;
use crate::version::VersionInfo;

pub struct RestyleService {
    orchestrator: Arc<JobOrchestrator>,
    status: StatusService,
    version: VersionInfo,
}

impl RestyleService {
    pub fn new(orchestrator: JobOrchestrator) -> Self {
        let status = StatusService::new(Arc::clone(orchestrator.store()));
        Self {
            orchestrator: Arc::new(orchestrator),
            status,
            version: VersionInfo::new(),
        }
    }

    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    /// Wire up the production collaborators from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let predictor = ReplicateClient::new(config.predictor.clone())
            .context("failed to build predictor client")?;
        let object_store =
            HttpObjectStore::new(config.upload.clone()).context("failed to build object store")?;

        let publisher: Arc<dyn SnapshotPublisher> = match &config.github {
            Some(github) => {
                tracing::info!(repo = %github.repo, branch = %github.branch, "Snapshot publishing enabled");
                Arc::new(
                    GithubPublisher::new(github.clone())
                        .context("failed to build snapshot publisher")?,
                )
            }
            None => {
                tracing::info!("GITHUB_TOKEN or GITHUB_REPO not set, snapshot publishing disabled");
                Arc::new(NoopPublisher)
            }
        };

        let version = VersionInfo::new().with_model(predictor.model_version());
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

        let orchestrator = JobOrchestrator::new(
            Arc::new(predictor),
            Arc::new(PngNormalizer::new(config.max_dimension)),
            Arc::new(object_store),
            store,
        )
        .with_poller(ResultPoller::new(config.poll))
        .with_publisher(publisher)
        .with_snapshot_dir(config.snapshot_dir.clone());

        Ok(Self::new(orchestrator).with_version(version))
    }

    /// Run a job to completion.
    ///
    /// The job runs on its own task, so a dropped caller (client disconnect)
    /// does not abandon it halfway. Its outcome is still recorded.
    pub async fn submit(&self, request: JobRequest) -> Result<String, JobError> {
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move { orchestrator.run(request).await })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Job task failed");
                JobError::TaskLost(e.to_string())
            })?
    }

    pub fn status(&self, identifier: Option<&str>) -> Result<JobStatus, JobError> {
        self.status.get_status(identifier)
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }
}
