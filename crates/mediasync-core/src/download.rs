//! Integrity-checked transfer of remote resources into the local archive.
//!
//! Bytes land in a temp file in a scratch directory first, are checked
//! against the expected size, then renamed into place. A destination that
//! already exists is never overwritten.
//!
//! On failure the temp file is left behind for inspection, except after a
//! size mismatch, where the partial file is known to be bad and is removed.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::DownloadError;

/// Prefix of every temp file this tool creates, to make orphans easy to find.
pub const TEMP_PREFIX: &str = "mediasync-";

/// Largest size that can be verified against the local file size.
pub const MAX_VERIFIABLE_SIZE: u64 = i64::MAX as u64;

/// Source of bytes for a transfer.
pub trait ResourceFetcher {
    fn fetch(&self, uri: &str) -> io::Result<Box<dyn Read>>;
}

/// Reads plain paths and `file://` URIs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFiles;

impl ResourceFetcher for LocalFiles {
    fn fetch(&self, uri: &str) -> io::Result<Box<dyn Read>> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        Ok(Box::new(File::open(path)?))
    }
}

#[derive(Debug, Clone)]
pub struct DownloadPipeline {
    scratch_dir: PathBuf,
}

impl Default for DownloadPipeline {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl DownloadPipeline {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Copy `source` to `destination`.
    ///
    /// `prefix` is added to the temp file name; `expected_size`, when given,
    /// must equal the number of bytes received.
    pub fn transfer(
        &self,
        fetcher: &dyn ResourceFetcher,
        source: &str,
        destination: &Path,
        prefix: Option<&str>,
        expected_size: Option<u64>,
    ) -> Result<u64, DownloadError> {
        if let Some(size) = expected_size {
            if size > MAX_VERIFIABLE_SIZE {
                return Err(DownloadError::TooLarge(size));
            }
        }

        if destination.exists() {
            return Err(DownloadError::FileExists(destination.to_path_buf()));
        }

        let temp_prefix = match prefix {
            Some(p) => format!("{TEMP_PREFIX}{p}-"),
            None => TEMP_PREFIX.to_string(),
        };
        let (temp_file, temp_path) = tempfile::Builder::new()
            .prefix(&temp_prefix)
            .tempfile_in(&self.scratch_dir)
            .and_then(|named| named.keep().map_err(|e| e.error))
            .map_err(|source| DownloadError::TempFile {
                dir: self.scratch_dir.clone(),
                source,
            })?;

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| DownloadError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!(source, temp = %temp_path.display(), "Downloading");
        let actual = copy_into(fetcher, source, temp_file).map_err(|e| DownloadError::Copy {
            source_uri: source.to_string(),
            temp: temp_path.clone(),
            source: e,
        })?;

        if let Some(expected) = expected_size {
            if expected < MAX_VERIFIABLE_SIZE && actual != expected {
                if let Err(e) = fs::remove_file(&temp_path) {
                    warn!(temp = %temp_path.display(), error = %e, "Unable to remove partial download");
                }
                return Err(DownloadError::SizeMismatch { expected, actual });
            }
        }

        fs::rename(&temp_path, destination).map_err(|source| DownloadError::Rename {
            from: temp_path.clone(),
            to: destination.to_path_buf(),
            source,
        })?;

        restrict_permissions(destination).map_err(|source| DownloadError::Permissions {
            path: destination.to_path_buf(),
            source,
        })?;

        info!(destination = %destination.display(), bytes = actual, "Download complete");
        Ok(actual)
    }
}

fn copy_into(fetcher: &dyn ResourceFetcher, source: &str, file: File) -> io::Result<u64> {
    let mut reader = fetcher.fetch(source)?;
    let mut writer = BufWriter::new(file);
    io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

/// Owner and group read-write, nothing for others (-rw-rw----).
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o660))
}

#[cfg(not(unix))]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}
