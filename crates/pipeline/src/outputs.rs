//! Output locations and existence checks.
//!
//! A job is only marked completed once its output file has been verified
//! to exist and be non-empty.

use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Subdirectories of the output root, one per producer.
pub const CLIPS_DIR: &str = "clips";
pub const MERGES_DIR: &str = "merges";
pub const UPSCALES_DIR: &str = "upscales";
pub const INTERPOLATIONS_DIR: &str = "interpolations";
pub const EXPORTS_DIR: &str = "exports";
pub const LONG_VIDEO_DIR: &str = "long_video";
pub const THUMBNAILS_DIR: &str = "thumbnails";
pub const REFERENCES_DIR: &str = "references";

/// `<root>/<subdir>/<file_name>`, creating the directory.
pub async fn output_path(
    root: &Path,
    subdir: &str,
    file_name: &str,
) -> Result<PathBuf, PipelineError> {
    let dir = root.join(subdir);
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir.join(file_name))
}

/// Resolve a stored path: absolute paths are kept, relative ones are
/// taken against the output root.
pub fn resolve(root: &Path, stored: &str) -> PathBuf {
    let path = Path::new(stored);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Confirm that `path` exists and is a non-empty file. Returns its size.
pub async fn verify_output(path: &Path) -> Result<u64, PipelineError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(PipelineError::ArtifactMissing(format!(
            "{} is empty or not a file",
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
            PipelineError::ArtifactMissing(format!("{} does not exist", path.display())),
        ),
        Err(e) => Err(e.into()),
    }
}

/// Remove a file, ignoring a missing one. Failures are logged only.
pub async fn remove_best_effort(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

/// File name component of a path as an owned string.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Path rendered for storage in the job store.
pub fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
