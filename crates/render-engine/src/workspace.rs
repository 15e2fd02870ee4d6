//! Per-job scratch space.
//!
//! Downloads and the staging output live in a temporary directory that is
//! removed when the [`JobWorkspace`] is dropped, whether the job succeeded,
//! failed or was cancelled. Only [`JobWorkspace::finalize`] moves the
//! rendered file out to its final location.

use std::path::{Path, PathBuf};

use inlay_common::error::{InlayError, InlayResult};
use tempfile::TempDir;

pub struct JobWorkspace {
    temp_dir: TempDir,
    job_id: String,
}

impl JobWorkspace {
    /// Create a workspace under the system temp dir.
    pub fn new(job_id: impl Into<String>) -> InlayResult<Self> {
        Self::create(job_id.into(), None)
    }

    /// Create a workspace under `root`, creating `root` if needed.
    pub fn new_in(root: &Path, job_id: impl Into<String>) -> InlayResult<Self> {
        std::fs::create_dir_all(root)?;
        Self::create(job_id.into(), Some(root))
    }

    fn create(job_id: String, root: Option<&Path>) -> InlayResult<Self> {
        let prefix = format!("inlay-{job_id}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let temp_dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| InlayError::render(format!("failed to create job workspace: {e}")))?;

        tracing::debug!(job_id = %job_id, dir = %temp_dir.path().display(), "Created job workspace");
        Ok(Self { temp_dir, job_id })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path for a named file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Where the render engine writes before the result is accepted.
    pub fn staging_output(&self) -> PathBuf {
        self.file("render.partial.mp4")
    }

    /// Move the staging output to `dest`, creating parent directories.
    ///
    /// Tries a rename first. Across filesystems the file is copied to a
    /// temporary sibling of `dest` and renamed over it, so `dest` is never
    /// left half-written. Consumes the workspace, which deletes everything
    /// else.
    pub fn finalize(self, dest: &Path) -> InlayResult<PathBuf> {
        let staged = self.staging_output();
        if !staged.is_file() {
            return Err(InlayError::render(format!(
                "render produced no output at {}",
                staged.display()
            )));
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        if std::fs::rename(&staged, dest).is_err() {
            copy_into_place(&staged, dest).map_err(|e| {
                InlayError::render(format!(
                    "failed to copy output to {}: {e}",
                    dest.display()
                ))
            })?;
            let _ = std::fs::remove_file(&staged);
        }

        tracing::debug!(job_id = %self.job_id, dest = %dest.display(), "Finalized render output");
        Ok(dest.to_path_buf())
    }
}

/// Copy `src` into a temp file beside `dest`, then rename it into place.
/// The temp file is removed on any error.
fn copy_into_place(src: &Path, dest: &Path) -> std::io::Result<()> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut source = std::fs::File::open(src)?;
    let mut partial = tempfile::Builder::new()
        .prefix(".inlay-")
        .suffix(".partial")
        .tempfile_in(dir)?;

    std::io::copy(&mut source, partial.as_file_mut())?;
    partial.as_file().sync_all()?;
    std::fs::set_permissions(partial.path(), source.metadata()?.permissions())?;
    partial.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let ws = JobWorkspace::new("render_1_0").unwrap();
        let dir = ws.dir().to_path_buf();
        std::fs::write(ws.file("a_roll.mp4"), b"x").unwrap();
        assert!(dir.exists());
        drop(ws);
        assert!(!dir.exists());
    }

    #[test]
    fn test_workspace_in_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("jobs");
        let ws = JobWorkspace::new_in(&nested, "render_4_0").unwrap();
        assert!(ws.dir().starts_with(&nested));
        assert_eq!(ws.job_id(), "render_4_0");
        drop(ws);
        assert!(entries(&nested).is_empty());
    }

    #[test]
    fn test_finalize_moves_staging_output() {
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("nested").join("final.mp4");

        let ws = JobWorkspace::new("render_2_0").unwrap();
        std::fs::write(ws.staging_output(), b"video").unwrap();
        let dir = ws.dir().to_path_buf();

        let path = ws.finalize(&dest).unwrap();
        assert_eq!(path, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"video");
        assert!(!dir.exists());
    }

    #[test]
    fn test_copy_into_place_leaves_only_dest() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("render.partial.mp4");
        std::fs::write(&src, b"video").unwrap();

        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("final.mp4");
        copy_into_place(&src, &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"video");
        assert_eq!(entries(out.path()), vec!["final.mp4"]);
    }

    #[test]
    fn test_failed_copy_keeps_dest_untouched() {
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("final.mp4");
        std::fs::write(&dest, b"previous render").unwrap();

        let missing = out.path().join("gone.mp4");
        assert!(copy_into_place(&missing, &dest).is_err());
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous render");
        assert_eq!(entries(out.path()), vec!["final.mp4"]);

        // A directory in the way fails at the rename; the temp copy goes too.
        let src = out.path().join("final.mp4");
        let blocked = out.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), b"x").unwrap();
        assert!(copy_into_place(&src, &blocked).is_err());
        assert_eq!(entries(out.path()), vec!["blocked", "final.mp4"]);
    }

    #[test]
    fn test_finalize_without_output_fails() {
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("final.mp4");
        let ws = JobWorkspace::new("render_3_0").unwrap();
        assert!(ws.finalize(&dest).is_err());
        assert!(!dest.exists());
    }
}
