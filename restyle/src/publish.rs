//! Snapshot publisher for completed jobs.
//!
//! Commits one JSON file per job to a GitHub repository through the
//! contents API. Publishing is best effort: callers log failures and move on.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine as _;

use crate::error::JobError;
use crate::version::RESTYLE_VERSION;

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

#[async_trait]
pub trait SnapshotPublisher: Send + Sync {
    async fn publish(
        &self,
        path: &str,
        payload: &serde_json::Value,
        message: &str,
    ) -> Result<(), JobError>;
}

/// Used when no snapshot repository is configured.
pub struct NoopPublisher;

#[async_trait]
impl SnapshotPublisher for NoopPublisher {
    async fn publish(
        &self,
        path: &str,
        _payload: &serde_json::Value,
        _message: &str,
    ) -> Result<(), JobError> {
        tracing::debug!(%path, "Snapshot publishing disabled, skipping");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_base: String,
    pub token: String,
    /// `owner/name`.
    pub repo: String,
    pub branch: String,
}

impl GithubConfig {
    pub fn new(token: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API.to_string(),
            token: token.into(),
            repo: repo.into(),
            branch: "main".to_string(),
        }
    }
}

pub struct GithubPublisher {
    api_base: String,
    repo: String,
    branch: String,
    client: reqwest::Client,
}

impl GithubPublisher {
    pub fn new(config: GithubConfig) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();

        let auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.token))
            .context("GitHub token is not a valid header value")?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );

        // GitHub rejects requests without a user agent
        let user_agent = format!("restyle/{}", RESTYLE_VERSION);
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&user_agent) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to create GitHub HTTP client")?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repo: config.repo,
            branch: config.branch,
            client,
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_base,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    /// Blob sha of the file if it already exists on the branch.
    async fn existing_sha(&self, url: &str) -> Result<Option<String>, JobError> {
        let response = self
            .client
            .get(url)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| JobError::Publish(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::Publish(format!(
                "lookup returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| JobError::Publish(format!("invalid lookup body: {}", e)))?;
        Ok(body.get("sha").and_then(|s| s.as_str()).map(str::to_string))
    }
}

#[async_trait]
impl SnapshotPublisher for GithubPublisher {
    async fn publish(
        &self,
        path: &str,
        payload: &serde_json::Value,
        message: &str,
    ) -> Result<(), JobError> {
        let url = self.contents_url(path);
        let sha = self.existing_sha(&url).await?;

        let content = serde_json::to_vec_pretty(payload)
            .map_err(|e| JobError::Publish(format!("failed to serialize snapshot: {}", e)))?;

        let mut body = serde_json::json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
            "branch": self.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = serde_json::Value::String(sha);
        }

        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| JobError::Publish(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::Publish(format!(
                "commit returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        tracing::info!(%path, repo = %self.repo, "Published job snapshot");
        Ok(())
    }
}

/// Repository path for a job's snapshot file.
///
/// Distinct identifiers always map to distinct paths. Bytes outside
/// `[A-Za-z0-9._-]` are written as `~XX` (hex), as is a leading `.`, and the
/// empty identifier becomes a lone `~`.
pub fn snapshot_path(dir: &str, identifier: &str) -> String {
    let name = escape_identifier(identifier);

    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        format!("{}.json", name)
    } else {
        format!("{}/{}.json", dir, name)
    }
}

fn escape_identifier(identifier: &str) -> String {
    if identifier.is_empty() {
        return "~".to_string();
    }

    let mut name = String::with_capacity(identifier.len());
    for (i, byte) in identifier.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(byte, b'_' | b'-')
            || (byte == b'.' && i > 0);
        if keep {
            name.push(byte as char);
        } else {
            name.push_str(&format!("~{:02X}", byte));
        }
    }
    name
}
