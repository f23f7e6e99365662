//! Error taxonomy for the job pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    /// Missing or malformed caller input.
    #[error("{0}")]
    Validation(String),

    /// Image normalization or upload failed.
    #[error("Upstream I/O failed: {0}")]
    UpstreamIo(String),

    /// The predictor refused the job at submit time.
    #[error("Prediction submission failed: {body}")]
    Submission { status: Option<u16>, body: String },

    /// The predictor reported a terminal error state.
    #[error("Prediction failed: {}", describe_failure(.0))]
    PredictionFailed(serde_json::Value),

    #[error("Prediction did not finish after {attempts} status checks")]
    PollTimeout { attempts: u32 },

    /// A single status probe failed. Absorbed by the poller.
    #[error("Status check failed: {0}")]
    StatusProbe(String),

    /// Snapshot publish failed. Only ever logged.
    #[error("Snapshot publish failed: {0}")]
    Publish(String),

    #[error("Job task lost: {0}")]
    TaskLost(String),
}

impl JobError {
    /// True for errors the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Reclassify a collaborator failure as [`JobError::UpstreamIo`].
    pub(crate) fn into_upstream(self) -> Self {
        match self {
            err @ Self::UpstreamIo(_) => err,
            other => Self::UpstreamIo(other.to_string()),
        }
    }
}

/// Prefer the predictor's own error message, fall back to the raw payload.
fn describe_failure(payload: &serde_json::Value) -> String {
    match payload.get("error") {
        Some(serde_json::Value::String(msg)) if !msg.is_empty() => msg.clone(),
        _ => payload.to_string(),
    }
}
