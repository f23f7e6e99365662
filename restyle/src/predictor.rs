//! Prediction client: submit one job, probe its status.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;

use crate::error::JobError;
use crate::job::{JobSubmission, JobToken, PredictionStatus, extract_artifact};
use crate::version::RESTYLE_VERSION;

pub const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";

/// One status report from the predictor, with the raw payload kept for
/// diagnostics.
#[derive(Debug, Clone)]
pub struct StatusReport {
    status: PredictionStatus,
    payload: serde_json::Value,
}

impl StatusReport {
    pub fn from_payload(payload: serde_json::Value) -> Self {
        let status = payload
            .get("status")
            .and_then(|s| s.as_str())
            .map(PredictionStatus::parse)
            .unwrap_or(PredictionStatus::Unknown);
        Self { status, payload }
    }

    pub fn status(&self) -> PredictionStatus {
        self.status
    }

    /// Raw status string, for logging unrecognized states.
    pub fn raw_status(&self) -> &str {
        self.payload
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn artifact_url(&self) -> Option<String> {
        self.payload.get("output").and_then(extract_artifact)
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn into_payload(self) -> serde_json::Value {
        self.payload
    }
}

/// One status probe for a submitted job.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn status(&self, token: &JobToken) -> Result<StatusReport, JobError>;
}

/// Submits jobs. Never retries: a rejected submission is final.
#[async_trait]
pub trait Predictor: StatusSource {
    async fn submit(&self, submission: &JobSubmission) -> Result<JobToken, JobError>;
}

/// Fixed processing parameters sent with every job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionParams {
    pub prompt_strength: f64,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    pub scheduler: String,
    pub num_outputs: u32,
}

impl Default for PredictionParams {
    fn default() -> Self {
        Self {
            prompt_strength: 0.8,
            num_inference_steps: 25,
            guidance_scale: 7.5,
            scheduler: "K_EULER".to_string(),
            num_outputs: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PredictorConfig {
    pub api_base: String,
    pub api_token: String,
    pub model_version: String,
    pub params: PredictionParams,
    pub request_timeout: Duration,
}

impl PredictorConfig {
    pub fn new(api_token: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_token: api_token.into(),
            model_version: model_version.into(),
            params: PredictionParams::default(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// HTTP client for a Replicate-compatible predictions API.
pub struct ReplicateClient {
    api_base: String,
    model_version: String,
    params: PredictionParams,
    client: reqwest::Client,
}

impl ReplicateClient {
    pub fn new(config: PredictorConfig) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();

        let auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.api_token))
            .context("predictor API token is not a valid header value")?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let user_agent = format!("restyle/{}", RESTYLE_VERSION);
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&user_agent) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .context("failed to create predictor HTTP client")?;

        reqwest::Url::parse(&config.api_base)
            .with_context(|| format!("predictor API base {:?} is not a URL", config.api_base))?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model_version: config.model_version,
            params: config.params,
            client,
        })
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// `{api_base}/predictions/{token}` with the token as a single escaped
    /// path segment.
    fn prediction_url(&self, token: &JobToken) -> Result<reqwest::Url, JobError> {
        if !is_path_safe(token.as_str()) {
            return Err(JobError::StatusProbe(format!(
                "Refusing to probe unusable token {:?}",
                token.as_str()
            )));
        }

        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| JobError::StatusProbe(format!("Invalid API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| JobError::StatusProbe("API base cannot take a path".to_string()))?
            .pop_if_empty()
            .push("predictions")
            .push(token.as_str());
        Ok(url)
    }

    fn build_input(&self, submission: &JobSubmission) -> serde_json::Value {
        let mut input = serde_json::to_value(&self.params)
            .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
        input["prompt"] = serde_json::Value::String(submission.prompt.clone());
        input["image"] = serde_json::Value::String(submission.image_url.clone());
        input
    }
}

#[async_trait]
impl StatusSource for ReplicateClient {
    async fn status(&self, token: &JobToken) -> Result<StatusReport, JobError> {
        let url = self.prediction_url(token)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| JobError::StatusProbe(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::StatusProbe(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| JobError::StatusProbe(format!("Invalid status body: {}", e)))?;
        Ok(StatusReport::from_payload(payload))
    }
}

#[async_trait]
impl Predictor for ReplicateClient {
    async fn submit(&self, submission: &JobSubmission) -> Result<JobToken, JobError> {
        let body = serde_json::json!({
            "version": self.model_version,
            "input": self.build_input(submission),
        });

        let response = self
            .client
            .post(format!("{}/predictions", self.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| JobError::Submission {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::error!(status = %status.as_u16(), body = %text, "Prediction submission rejected");
            return Err(JobError::Submission {
                status: Some(status.as_u16()),
                body: text,
            });
        }

        let token = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
            .filter(|id| is_path_safe(id));

        match token {
            Some(id) => Ok(JobToken::new(id)),
            None => {
                tracing::error!(body = %text, "Prediction submission response has no id");
                Err(JobError::Submission {
                    status: Some(status.as_u16()),
                    body: text,
                })
            }
        }
    }
}

/// Dot segments are dropped when a URL path is built, so they cannot name a
/// prediction.
fn is_path_safe(token: &str) -> bool {
    !matches!(token, "" | "." | "..")
}
