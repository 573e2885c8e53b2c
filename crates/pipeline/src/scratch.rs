//! Per-job scratch space for intermediate files.

use std::path::{Path, PathBuf};

use reelforge_core::types::DbId;

/// A scratch directory owned by one job run.
///
/// The directory and everything in it is removed when the value is
/// dropped, whether the run succeeded, failed, or was aborted by its
/// timeout.
#[derive(Debug)]
pub struct ScratchDir {
    dir: tempfile::TempDir,
}

impl ScratchDir {
    /// Create `<root>/job_<id>_XXXXXX`, creating `root` if needed.
    pub fn create(root: &Path, job_id: DbId) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("job_{job_id}_"))
            .tempdir_in(root)?;
        tracing::debug!(job_id, path = %dir.path().display(), "Created scratch directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
