use std::path::{Path, PathBuf};

/// Owns a transient path and removes it when dropped, on every exit path.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A fresh, unique path in the system temp directory.
    pub fn unique(prefix: &str, extension: &str) -> Self {
        let name = format!("{prefix}_{}{extension}", uuid::Uuid::new_v4().simple());
        Self::new(std::env::temp_dir().join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "transient file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "failed to remove transient file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_file_on_drop() {
        let guard = TransientFile::unique("transient_test", ".bin");
        std::fs::write(guard.path(), b"x").unwrap();
        let path = guard.path().to_path_buf();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_is_fine() {
        let guard = TransientFile::unique("transient_never_written", ".png");
        assert!(!guard.path().exists());
        drop(guard);
    }

    #[test]
    fn unique_paths_differ() {
        let a = TransientFile::unique("same", ".png");
        let b = TransientFile::unique("same", ".png");
        assert_ne!(a.path(), b.path());
        assert!(a.path().to_string_lossy().ends_with(".png"));
    }
}
