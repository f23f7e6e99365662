//! Source image normalization: decode the inline payload, bound its size,
//! re-encode as PNG.

use std::io::Cursor;

use async_trait::async_trait;
use base64::Engine as _;
use image::ImageFormat;
use image::imageops::FilterType;

use crate::error::JobError;

pub const DEFAULT_MAX_DIMENSION: u32 = 768;

#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait ImageNormalizer: Send + Sync {
    /// `payload` is base64, optionally wrapped as a `data:` URL.
    async fn normalize(&self, payload: &str) -> Result<NormalizedImage, JobError>;
}

/// Downscales to fit a square bound, preserving aspect ratio. Smaller
/// images pass through at their original size.
pub struct PngNormalizer {
    max_dimension: u32,
}

impl PngNormalizer {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }
}

impl Default for PngNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION)
    }
}

#[async_trait]
impl ImageNormalizer for PngNormalizer {
    async fn normalize(&self, payload: &str) -> Result<NormalizedImage, JobError> {
        let payload = payload.to_string();
        let max_dimension = self.max_dimension;
        tokio::task::spawn_blocking(move || normalize_blocking(&payload, max_dimension))
            .await
            .map_err(|e| JobError::UpstreamIo(format!("Image task failed: {}", e)))?
    }
}

fn normalize_blocking(payload: &str, max_dimension: u32) -> Result<NormalizedImage, JobError> {
    let raw = decode_payload(payload)?;

    let mut img = image::load_from_memory(&raw)
        .map_err(|e| JobError::UpstreamIo(format!("Failed to decode image: {}", e)))?;

    if img.width() > max_dimension || img.height() > max_dimension {
        img = img.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    }

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| JobError::UpstreamIo(format!("Failed to encode image: {}", e)))?;

    tracing::debug!(
        width = img.width(),
        height = img.height(),
        size = bytes.len(),
        "Normalized source image"
    );

    Ok(NormalizedImage {
        bytes,
        content_type: "image/png",
        width: img.width(),
        height: img.height(),
    })
}

/// Strip an optional `data:<mime>;base64,` prefix and decode.
fn decode_payload(payload: &str) -> Result<Vec<u8>, JobError> {
    let trimmed = payload.trim();
    let encoded = match trimmed.strip_prefix("data:") {
        Some(rest) => {
            rest.split_once(',')
                .ok_or_else(|| JobError::UpstreamIo("Malformed data URL".to_string()))?
                .1
        }
        None => trimmed,
    };

    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| JobError::UpstreamIo(format!("Invalid base64 image payload: {}", e)))
}
