// Synthetic input and clipboard through X11 utilities (xdotool, xclip).
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{BridgeError, BridgeResult};
use crate::executor::command::{run_holder, run_tool, DEFAULT_TOOL_TIMEOUT};
use crate::transient::TransientFile;

/// Stateless, fire-and-forget input primitives.
///
/// Implementations: `XdotoolInjector` (real X11 input), recording fakes in tests.
#[async_trait]
pub trait InputInjector: Send + Sync {
    /// Move the pointer to `(x, y)` and left-click.
    async fn click(&self, x: i32, y: i32) -> BridgeResult<()>;

    /// Press a key or key combination, e.g. `"ctrl+v"` or `"Return"`.
    async fn key(&self, combo: &str) -> BridgeResult<()>;

    async fn set_clipboard_text(&self, text: &str) -> BridgeResult<()>;

    async fn set_clipboard_image(&self, path: &Path) -> BridgeResult<()>;

    /// Raise the last visible window whose title matches `pattern`.
    /// Returns false when no window matched.
    async fn activate_window(&self, pattern: &str) -> BridgeResult<bool>;
}

pub struct XdotoolInjector {
    xdotool: String,
    xclip: String,
    /// Pause between pointer move and button press.
    click_settle: Duration,
    /// How long xclip gets to fail before it is considered to be holding the selection.
    clipboard_grace: Duration,
}

impl XdotoolInjector {
    pub fn new(click_settle: Duration) -> Self {
        Self {
            xdotool: "xdotool".into(),
            xclip: "xclip".into(),
            click_settle,
            clipboard_grace: Duration::from_millis(500),
        }
    }
}

impl Default for XdotoolInjector {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl InputInjector for XdotoolInjector {
    async fn click(&self, x: i32, y: i32) -> BridgeResult<()> {
        let (xs, ys) = (x.to_string(), y.to_string());
        run_tool(&self.xdotool, &["mousemove", &xs, &ys], DEFAULT_TOOL_TIMEOUT).await?;
        tokio::time::sleep(self.click_settle).await;
        run_tool(&self.xdotool, &["click", "1"], DEFAULT_TOOL_TIMEOUT).await?;
        tracing::debug!(x, y, "clicked");
        Ok(())
    }

    async fn key(&self, combo: &str) -> BridgeResult<()> {
        run_tool(&self.xdotool, &["key", combo], DEFAULT_TOOL_TIMEOUT).await?;
        tracing::debug!(combo, "key sent");
        Ok(())
    }

    async fn set_clipboard_text(&self, text: &str) -> BridgeResult<()> {
        run_holder(
            &self.xclip,
            &["-selection", "clipboard"],
            Some(text.as_bytes()),
            self.clipboard_grace,
        )
        .await
        .map_err(|f| BridgeError::Clipboard(f.to_string()))?;
        tracing::debug!(chars = text.chars().count(), "clipboard text set");
        Ok(())
    }

    async fn set_clipboard_image(&self, path: &Path) -> BridgeResult<()> {
        if !path.exists() {
            return Err(BridgeError::Clipboard(format!("file not found: {}", path.display())));
        }

        // The target application only accepts PNG pastes reliably.
        let converted = ensure_png(path).await?;
        let target = converted
            .as_ref()
            .map(|t| t.path().to_path_buf())
            .unwrap_or_else(|| path.to_path_buf());
        let target_str = target.to_string_lossy();

        run_holder(
            &self.xclip,
            &["-selection", "clipboard", "-t", "image/png", "-i", &target_str],
            None,
            self.clipboard_grace,
        )
        .await
        .map_err(|f| BridgeError::Clipboard(f.to_string()))?;
        tracing::debug!(path = %target.display(), "clipboard image set");
        Ok(())
    }

    async fn activate_window(&self, pattern: &str) -> BridgeResult<bool> {
        let found = match run_tool(
            &self.xdotool,
            &["search", "--onlyvisible", "--name", pattern],
            DEFAULT_TOOL_TIMEOUT,
        )
        .await
        {
            Ok(out) => out.stdout,
            // xdotool search exits 1 when nothing matches.
            Err(_) => return Ok(false),
        };

        let Some(window_id) = found.lines().map(str::trim).filter(|l| !l.is_empty()).last() else {
            return Ok(false);
        };
        run_tool(&self.xdotool, &["windowactivate", "--sync", window_id], DEFAULT_TOOL_TIMEOUT).await?;
        tracing::info!(pattern, window_id, "window activated");
        Ok(true)
    }
}

/// Re-encodes non-PNG images to a transient PNG. `None` means the source is already PNG.
pub async fn ensure_png(path: &Path) -> BridgeResult<Option<TransientFile>> {
    let source: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> BridgeResult<Option<TransientFile>> {
        let format = image::ImageFormat::from_path(&source).ok();
        let reader = image::ImageReader::open(&source)?.with_guessed_format()?;
        let detected = reader.format().or(format);
        if detected == Some(image::ImageFormat::Png) {
            return Ok(None);
        }
        tracing::info!(path = %source.display(), format = ?detected, "converting image to PNG for clipboard");
        let img = reader
            .decode()
            .map_err(|e| BridgeError::Decode(format!("{}: {e}", source.display())))?;
        let out = TransientFile::unique("gravity_clip", ".png");
        img.save_with_format(out.path(), image::ImageFormat::Png)?;
        Ok(Some(out))
    })
    .await
    .map_err(|e| BridgeError::Clipboard(format!("conversion task failed: {e}")))?
}
