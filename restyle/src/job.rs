//! Job lifecycle types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status string reported by the prediction API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    /// Anything the API reports that we do not recognize.
    Unknown,
}

impl PredictionStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "starting" => Self::Starting,
            "processing" => Self::Processing,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            _ => Self::Unknown,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Unknown => "unknown",
        }
    }
}

/// Opaque polling key handed out by the predictor at submit time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobToken(String);

impl JobToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inbound transformation request, as posted by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRequest {
    pub id: Option<String>,
    pub prompt: Option<String>,
    /// Source image as base64 or a `data:` URL.
    pub image: Option<String>,
}

/// What the predictor receives once the source image has a durable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSubmission {
    pub identifier: String,
    pub prompt: String,
    pub image_url: String,
}

/// Result of a successful job. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub identifier: String,
    pub prompt: String,
    pub artifact_url: String,
    /// RFC 3339, UTC.
    pub completed_at: String,
}

impl JobOutcome {
    pub fn completed_now(identifier: String, prompt: String, artifact_url: String) -> Self {
        Self {
            identifier,
            prompt,
            artifact_url,
            completed_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Pull the artifact reference out of a prediction output.
///
/// A list yields its first element, anything else is taken as is. Only
/// non-empty strings count as a reference.
pub fn extract_artifact(output: &serde_json::Value) -> Option<String> {
    let value = match output {
        serde_json::Value::Array(items) => items.first()?,
        other => other,
    };
    value
        .as_str()
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}
