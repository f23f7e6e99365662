//! Process configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::normalize::DEFAULT_MAX_DIMENSION;
use crate::orchestrator::DEFAULT_SNAPSHOT_DIR;
use crate::poller::PollConfig;
use crate::predictor::PredictorConfig;
use crate::publish::GithubConfig;
use crate::transport::http::ServerConfig;
use crate::upload::UploadConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is not valid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub predictor: PredictorConfig,
    pub poll: PollConfig,
    pub max_dimension: u32,
    pub upload: UploadConfig,
    /// `None` disables snapshot publishing.
    pub github: Option<GithubConfig>,
    pub snapshot_dir: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                   | Default                        |
    /// |---------------------------|--------------------------------|
    /// | `HOST`                    | `0.0.0.0`                      |
    /// | `PORT`                    | `5000`                         |
    /// | `MAX_BODY_BYTES`          | `16777216`                     |
    /// | `REPLICATE_API_TOKEN`     | required                       |
    /// | `REPLICATE_MODEL_VERSION` | required                       |
    /// | `REPLICATE_API_BASE`      | `https://api.replicate.com/v1` |
    /// | `POLL_INTERVAL_MS`        | `3000`                         |
    /// | `POLL_TIMEOUT_MS`         | `180000`                       |
    /// | `IMAGE_MAX_DIMENSION`     | `768`                          |
    /// | `UPLOAD_ENDPOINT`         | required                       |
    /// | `UPLOAD_PUBLIC_URL`       | `UPLOAD_ENDPOINT`              |
    /// | `UPLOAD_TOKEN`            | none                           |
    /// | `GITHUB_TOKEN`            | none, publishing disabled      |
    /// | `GITHUB_REPO`             | none, publishing disabled      |
    /// | `GITHUB_BRANCH`           | `main`                         |
    /// | `SNAPSHOT_DIR`            | `results`                      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source.
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: var("HOST").unwrap_or(server_defaults.host),
            port: parsed(&var, "PORT")?.unwrap_or(server_defaults.port),
            max_body_bytes: parsed(&var, "MAX_BODY_BYTES")?
                .unwrap_or(server_defaults.max_body_bytes),
        };

        let mut predictor = PredictorConfig::new(
            required("REPLICATE_API_TOKEN")?,
            required("REPLICATE_MODEL_VERSION")?,
        );
        if let Some(api_base) = var("REPLICATE_API_BASE") {
            predictor = predictor.with_api_base(api_base);
        }

        let poll_defaults = PollConfig::default();
        let interval_ms: Option<u64> = parsed(&var, "POLL_INTERVAL_MS")?;
        if interval_ms == Some(0) {
            return Err(ConfigError::Invalid {
                name: "POLL_INTERVAL_MS",
                value: "0".to_string(),
            });
        }
        let poll = PollConfig {
            interval: interval_ms
                .map(Duration::from_millis)
                .unwrap_or(poll_defaults.interval),
            timeout: parsed(&var, "POLL_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(poll_defaults.timeout),
        };

        let max_dimension = parsed(&var, "IMAGE_MAX_DIMENSION")?.unwrap_or(DEFAULT_MAX_DIMENSION);

        let mut upload = UploadConfig::new(required("UPLOAD_ENDPOINT")?);
        if let Some(public) = var("UPLOAD_PUBLIC_URL") {
            upload.public_base_url = public;
        }
        upload.token = var("UPLOAD_TOKEN");

        let github = match (var("GITHUB_TOKEN"), var("GITHUB_REPO")) {
            (Some(token), Some(repo)) => {
                let mut github = GithubConfig::new(token, repo);
                if let Some(branch) = var("GITHUB_BRANCH") {
                    github.branch = branch;
                }
                Some(github)
            }
            _ => None,
        };

        Ok(Self {
            server,
            predictor,
            poll,
            max_dimension,
            upload,
            github,
            snapshot_dir: var("SNAPSHOT_DIR").unwrap_or_else(|| DEFAULT_SNAPSHOT_DIR.to_string()),
        })
    }
}

fn parsed<T, F>(var: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
