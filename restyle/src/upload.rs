//! Durable upload of the normalized source image.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::error::JobError;
use crate::version::RESTYLE_VERSION;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` and return a URL the predictor can fetch.
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, JobError>;
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Base URL objects are `PUT` under.
    pub endpoint: String,
    /// Base URL objects are publicly readable under.
    pub public_base_url: String,
    pub token: Option<String>,
    pub key_prefix: String,
}

impl UploadConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            public_base_url: endpoint.clone(),
            endpoint,
            token: None,
            key_prefix: "restyle".to_string(),
        }
    }
}

/// Object store speaking plain HTTP `PUT` (S3-compatible gateways, R2 and
/// friends behind a presigning proxy).
pub struct HttpObjectStore {
    endpoint: String,
    public_base_url: String,
    key_prefix: String,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(config: UploadConfig) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();

        if let Some(ref token) = config.token {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                .context("upload token is not a valid header value")?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let user_agent = format!("restyle/{}", RESTYLE_VERSION);
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&user_agent) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to create upload HTTP client")?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            key_prefix: config.key_prefix.trim_matches('/').to_string(),
            client,
        })
    }

    fn object_key(&self, content_type: &str) -> String {
        let name = format!("{}.{}", uuid::Uuid::new_v4(), extension_for(content_type));
        if self.key_prefix.is_empty() {
            name
        } else {
            format!("{}/{}", self.key_prefix, name)
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, JobError> {
        let key = self.object_key(content_type);
        let size = bytes.len();

        let response = self
            .client
            .put(format!("{}/{}", self.endpoint, key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| JobError::UpstreamIo(format!("Upload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::UpstreamIo(format!(
                "Upload rejected with HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let url = format!("{}/{}", self.public_base_url, key);
        tracing::debug!(%url, size, "Uploaded source image");
        Ok(url)
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "bin",
    }
}
