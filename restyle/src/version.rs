//! Version information for restyle.

/// Restyle version from Cargo.toml
pub const RESTYLE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version information reported by the health check.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub restyle: &'static str,
    /// Predictor model version jobs are submitted against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            restyle: RESTYLE_VERSION,
            model: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, version: impl Into<String>) -> Self {
        self.model = Some(version.into());
        self
    }
}
