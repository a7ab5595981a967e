//! Materializing images as executable files

use std::env;
use std::fs::{self, File, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use shellrun_core::{Result, ShellrunError, spawn_lock};
use shellrun_elf::ExecutableImage;
use tempfile::PersistError;

/// Permission bits of a staged file: owner read, write and execute
pub const STAGED_MODE: u32 = 0o700;

/// Default staged file name prefix
pub const DEFAULT_PREFIX: &str = "shellrun-";

/// What happens to a staged file once its handle goes away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cleanup {
    /// Leave the file in place
    #[default]
    Keep,
    /// Remove the file when the [`StagedExecutable`] is dropped
    OnDrop,
}

/// Writes images to uniquely named executable files
#[derive(Debug, Clone)]
pub struct Stager {
    dir: Option<PathBuf>,
    prefix: String,
    cleanup: Cleanup,
}

impl Default for Stager {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: DEFAULT_PREFIX.to_string(),
            cleanup: Cleanup::default(),
        }
    }
}

impl Stager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage under `dir` instead of the OS temp dir
    pub fn dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn cleanup(mut self, cleanup: Cleanup) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Directory staged files are created in
    pub fn staging_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(env::temp_dir)
    }

    pub fn stage(&self, image: &ExecutableImage) -> Result<StagedExecutable> {
        self.stage_bytes(image.bytes())
    }

    /// Write `bytes` to a fresh file and mark it executable.
    ///
    /// The name is allocated with an exclusive create, so concurrent calls
    /// never share a file. The descriptor is closed before returning.
    pub fn stage_bytes(&self, bytes: &[u8]) -> Result<StagedExecutable> {
        let dir = self.staging_dir();
        let _lock = spawn_lock();

        let temp = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempfile_in(&dir)
            .map_err(|e| ShellrunError::staging(&dir, e))?;

        let (file, path) = temp
            .keep()
            .map_err(|PersistError { error, file }| ShellrunError::staging(file.path(), error))?;

        if let Err(e) = write_executable(file, bytes) {
            if let Err(rm) = fs::remove_file(&path) {
                warn!("failed to remove partial {}: {}", path.display(), rm);
            }
            return Err(ShellrunError::staging(&path, e));
        }

        debug!("staged {} bytes at {}", bytes.len(), path.display());
        Ok(StagedExecutable {
            path,
            remove_on_drop: self.cleanup == Cleanup::OnDrop,
        })
    }
}

// Takes the file by value so it is closed on every path out.
fn write_executable(mut file: File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()?;
    file.set_permissions(Permissions::from_mode(STAGED_MODE))
}

/// A staged executable file
#[derive(Debug)]
pub struct StagedExecutable {
    path: PathBuf,
    remove_on_drop: bool,
}

impl StagedExecutable {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file regardless of the cleanup policy
    pub fn into_path(mut self) -> PathBuf {
        self.remove_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for StagedExecutable {
    fn drop(&mut self) {
        if !self.remove_on_drop {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("removed staged {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove staged {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn staged_bytes_match_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let bytes: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

        let staged = Stager::new().dir(dir.path()).stage_bytes(&bytes).unwrap();

        assert_eq!(fs::read(staged.path()).unwrap(), bytes);
        assert!(staged.path().starts_with(dir.path()));
    }

    #[test]
    fn staged_file_is_owner_executable() {
        let dir = tempfile::tempdir().unwrap();
        let staged = Stager::new().dir(dir.path()).stage_bytes(b"\x90").unwrap();

        let mode = fs::metadata(staged.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, STAGED_MODE);
    }

    #[test]
    fn prefix_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let staged = Stager::new()
            .dir(dir.path())
            .prefix("probe-")
            .stage_bytes(b"\x90")
            .unwrap();

        let name = staged.path().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("probe-"), "{}", name);
    }

    #[test]
    fn keep_leaves_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let staged = Stager::new().dir(dir.path()).stage_bytes(b"\x90").unwrap();
            staged.path().to_path_buf()
        };
        assert!(path.exists());
    }

    #[test]
    fn on_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = Stager::new()
            .dir(dir.path())
            .cleanup(Cleanup::OnDrop)
            .stage_bytes(b"\x90")
            .unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());

        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn into_path_overrides_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let staged = Stager::new()
            .dir(dir.path())
            .cleanup(Cleanup::OnDrop)
            .stage_bytes(b"\x90")
            .unwrap();

        let path = staged.into_path();
        assert!(path.exists());
    }

    #[test]
    fn missing_directory_is_staging_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Stager::new()
            .dir(dir.path().join("absent"))
            .stage_bytes(b"\x90")
            .unwrap_err();
        assert!(matches!(err, ShellrunError::Staging { .. }));
    }

    #[test]
    fn concurrent_stages_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let stager = Arc::new(Stager::new().dir(dir.path()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let stager = Arc::clone(&stager);
                thread::spawn(move || stager.stage_bytes(b"same bytes").unwrap().into_path())
            })
            .collect();

        let paths: HashSet<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(paths.len(), 16);
        for path in &paths {
            assert_eq!(fs::read(path).unwrap(), b"same bytes");
        }
    }
}
