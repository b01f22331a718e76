// Full-screen capture through an external screenshot utility.
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;

use crate::errors::{BridgeError, BridgeResult};
use crate::executor::command::run_tool;
use crate::transient::TransientFile;

#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Captures the whole screen. The transient file, if any, is gone when this returns.
    async fn capture(&self) -> BridgeResult<DynamicImage>;
}

/// Captures with `scrot <path>` and decodes the PNG it writes.
pub struct ScrotCapture {
    program: String,
    timeout: Duration,
}

impl ScrotCapture {
    pub fn new() -> Self {
        Self::with_program("scrot")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for ScrotCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScreenCapture for ScrotCapture {
    async fn capture(&self) -> BridgeResult<DynamicImage> {
        let shot = TransientFile::unique("gravity_screen", ".png");
        let target = shot.path().to_string_lossy().into_owned();

        run_tool(&self.program, &[&target], self.timeout)
            .await
            .map_err(|f| BridgeError::Capture(f.to_string()))?;

        let img = decode_file(shot.path().to_path_buf()).await?;
        tracing::trace!(width = img.width(), height = img.height(), "screen captured");
        Ok(img)
    }
}

/// Decodes an image file on the blocking pool.
pub async fn decode_file(path: PathBuf) -> BridgeResult<DynamicImage> {
    tokio::task::spawn_blocking(move || {
        image::open(&path).map_err(|e| BridgeError::Decode(format!("{}: {e}", path.display())))
    })
    .await
    .map_err(|e| BridgeError::Decode(format!("decode task failed: {e}")))?
}
