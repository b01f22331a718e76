use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::config::TemplatesConfig;
use crate::errors::{BridgeError, BridgeResult};

/// Reference images the workflow looks for, resolved to absolute paths.
/// Nothing is cached: each check decodes the file again.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub input_surface: PathBuf,
    pub busy: PathBuf,
    /// Checked in order; the first one found on screen wins.
    pub accept: Vec<PathBuf>,
}

impl TemplateSet {
    pub fn new(input_surface: PathBuf, busy: PathBuf, accept: Vec<PathBuf>) -> Self {
        Self {
            input_surface,
            busy,
            accept,
        }
    }

    pub fn from_config(dir: &Path, config: &TemplatesConfig) -> Self {
        Self {
            input_surface: dir.join(&config.input_surface),
            busy: dir.join(&config.busy),
            accept: config.accept.iter().map(|name| dir.join(name)).collect(),
        }
    }

    /// Accept templates present on disk right now.
    pub fn existing_accept(&self) -> Vec<PathBuf> {
        self.accept.iter().filter(|p| p.exists()).cloned().collect()
    }

    /// Warns once at startup about templates that are not there yet.
    pub fn log_missing(&self) {
        for path in [&self.input_surface, &self.busy] {
            if !path.exists() {
                tracing::warn!(path = %path.display(), "template not found");
            }
        }
        let accept = self.existing_accept().len();
        tracing::info!(accept, configured = self.accept.len(), "accept templates available");
    }
}

/// Blocking decode of one reference image.
pub fn decode_template(path: &Path) -> BridgeResult<DynamicImage> {
    if !path.exists() {
        return Err(BridgeError::TemplateMissing(path.display().to_string()));
    }
    image::open(path).map_err(|e| BridgeError::Decode(format!("{}: {e}", path.display())))
}

/// File name for status messages, e.g. `input_box.png`.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
