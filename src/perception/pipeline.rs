/// Look for reference images on an already captured screen.
///
/// Decoding and scanning are CPU-bound, so both run on the blocking pool.
/// One capture is shared by every check of a poll tick.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;

use crate::errors::{BridgeError, BridgeResult};
use crate::perception::matcher::TemplateMatcher;
use crate::perception::templates::decode_template;
use crate::perception::types::{MatchLocation, MatchResult};

/// Decodes `template` and searches for it on `screen`.
pub async fn find_template(
    screen: Arc<DynamicImage>,
    template: &Path,
    matcher: TemplateMatcher,
) -> BridgeResult<MatchResult> {
    let path = template.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let reference = decode_template(&path)?;
        let found = matcher.locate(&*screen, &reference);
        tracing::trace!(template = %path.display(), found = found.is_some(), "template checked");
        Ok(found)
    })
    .await
    .map_err(|e| BridgeError::Decode(format!("match task failed: {e}")))?
}

/// First template of `candidates` that is on screen, in list order.
/// Templates absent from disk are skipped quietly; ones that fail to decode
/// are logged and skipped. The existence check happens with the decode, on
/// the blocking pool.
pub async fn find_first(
    screen: Arc<DynamicImage>,
    candidates: &[PathBuf],
    matcher: TemplateMatcher,
) -> Option<(PathBuf, MatchLocation)> {
    for path in candidates {
        match find_template(screen.clone(), path, matcher).await {
            Ok(Some(location)) => return Some((path.clone(), location)),
            Ok(None) => {}
            Err(BridgeError::TemplateMissing(_)) => {
                tracing::trace!(template = %path.display(), "template not on disk");
            }
            Err(e) => tracing::warn!(template = %path.display(), error = %e, "skipping template"),
        }
    }
    None
}
