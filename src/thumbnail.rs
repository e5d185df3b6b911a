use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Thumbnails fit inside this square, preserving aspect ratio.
pub const MAX_DIMENSION: u32 = 720;

/// First-attempt JPEG quality.
pub const BASE_QUALITY: u32 = 75;

/// Retry quality when the first render is over the size ceiling.
pub const RETRY_QUALITY: u32 = 60;

/// Renders above this size trigger the lower-quality retry.
pub const SIZE_CEILING: usize = 200 * 1024;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("thumbnail generation failed: {0}")]
    Failed(String),
}

/// Byte-producing thumbnail rasterizer over an image path. A trait seam
/// so tests can run the pipeline without an external tool installed.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    async fn thumbnail(&self, path: &Path) -> Result<Vec<u8>, ThumbnailError>;
}

/// [`Thumbnailer`] backed by the ImageMagick CLI.
#[derive(Clone, Default)]
pub struct MagickThumbnailer;

#[async_trait]
impl Thumbnailer for MagickThumbnailer {
    async fn thumbnail(&self, path: &Path) -> Result<Vec<u8>, ThumbnailError> {
        generate(path).await
    }
}

/// Produce a bounded-size JPEG thumbnail for an image on disk using the
/// ImageMagick CLI (`magick`, falling back to `convert`). Retries once at
/// lower quality when the render exceeds the size ceiling.
pub async fn generate(path: &Path) -> Result<Vec<u8>, ThumbnailError> {
    let bytes = render(path, BASE_QUALITY).await?;
    if bytes.len() <= SIZE_CEILING {
        return Ok(bytes);
    }

    debug!(
        size = bytes.len(),
        "thumbnail over size ceiling, retrying at lower quality"
    );
    render(path, RETRY_QUALITY).await
}

async fn render(path: &Path, quality: u32) -> Result<Vec<u8>, ThumbnailError> {
    let geometry = format!("{}x{}>", MAX_DIMENSION, MAX_DIMENSION);
    let quality_arg = quality.to_string();

    for tool in ["magick", "convert"] {
        let result = Command::new(tool)
            .arg(path)
            .args(["-auto-orient", "-thumbnail", &geometry, "-quality", &quality_arg])
            .arg("jpeg:-")
            .output()
            .await;

        match result {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(ThumbnailError::Failed(e.to_string())),
            Ok(output) if output.status.success() => return Ok(output.stdout),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(ThumbnailError::Failed(format!(
                    "{} exited with {}: {}",
                    tool,
                    output.status,
                    stderr.trim()
                )));
            }
        }
    }

    Err(ThumbnailError::Failed(
        "no ImageMagick binary (magick or convert) on PATH".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_source_reports_failure() {
        // Whichever branch runs (no ImageMagick, or ImageMagick with a
        // nonexistent input) this must surface as a thumbnail failure.
        let result = generate(Path::new("/definitely/not/here.jpg")).await;
        assert!(matches!(result, Err(ThumbnailError::Failed(_))));
    }
}
