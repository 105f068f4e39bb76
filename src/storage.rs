//! File persistence for the identity registry.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::identity::Registry;

/// Location of a registry document on disk.
///
/// Writes go through a temporary sibling file and an atomic rename, so a
/// crash leaves either the previous or the new registry, never a torn one.
#[derive(Clone, Debug)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns `true` if the registry file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Returns the path to the registry file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Reads and parses the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a registry.
    pub fn load_registry(&self) -> Result<Registry> {
        let data = fs::read(&self.path)
            .with_context(|| format!("failed to read registry {}", self.path.display()))?;
        serde_json::from_slice(&data).context("registry file is corrupted")
    }

    /// Serialises and atomically writes the registry.
    pub fn save_registry(&self, registry: &Registry) -> Result<()> {
        let data = serde_json::to_vec_pretty(registry)?;
        self.write_atomic(&data)?;
        debug!(path = %self.path.display(), identities = registry.len(), "registry saved");
        Ok(())
    }

    /// Writes `data` via temp file, fsync, rename and directory fsync.
    ///
    /// Creates parent directories if they don't exist.
    fn write_atomic(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .context("failed to create temporary file")?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Some(parent) = self.path.parent() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }

        Ok(())
    }

    /// `<file>.tmp.<16 hex chars>` next to the registry.
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8];
        getrandom::fill(&mut buf).map_err(|_| anyhow::anyhow!("OS random generator unavailable"))?;

        let file_name = self
            .path
            .file_name()
            .context("registry path has no file name")?
            .to_string_lossy();

        Ok(self
            .path
            .with_file_name(format!("{}.tmp.{}", file_name, hex::encode(buf))))
    }

    /// Atomically replaces the registry with the temporary file.
    ///
    /// Uses `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH`.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            fs::rename(tmp_path, &self.path)?;
            return Ok(());
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context("atomic replace failed");
        }

        Ok(())
    }

    /// On Unix, `rename()` is atomic within one filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}
