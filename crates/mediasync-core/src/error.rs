//! Error types for the synchronization core

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while cataloging local source files
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Two files in the tree claim the same catalog key
    #[error(
        "Source file '{key}' duplicate.\nVersion 1: {}\nVersion 2: {}",
        first.display(),
        second.display()
    )]
    DuplicateSourceFile {
        key: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// A single file could not be read or hashed
    #[error(transparent)]
    SourceFile(#[from] SourceFileError),

    /// The root directory itself could not be walked
    #[error("Unable to read source directory {}: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Per-file failure during a catalog walk
#[derive(Error, Debug)]
#[error("Unable to catalog source file {key} ({}): {source}", path.display())]
pub struct SourceFileError {
    pub key: String,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Errors raised by a single transfer attempt
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("File too large to verify: {0} bytes")]
    TooLarge(u64),

    #[error("File already exists {}", .0.display())]
    FileExists(PathBuf),

    #[error("Unable to create directory {}: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to create temporary file in {}: {source}", dir.display())]
    TempFile {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to download {source_uri} to {}: {source}", temp.display())]
    Copy {
        source_uri: String,
        temp: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Downloaded file size mismatch\n{expected} bytes on remote\n{actual} bytes locally")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Unable to move {} to {}: {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to change permissions on {}: {source}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors surfaced from the remote media service
#[derive(Error, Debug)]
pub enum RemoteError {
    /// API request returned an error status
    #[error("Media API error (status {status_code}): {message}")]
    Api { status_code: u16, message: String },

    #[error("Media not found: {key}")]
    NotFound { key: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            RemoteError::Parse(error.to_string())
        } else {
            RemoteError::Network(error.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown instance '{0}'")]
    UnknownInstance(String),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error(
        "Another run holds the lock {} ({holder}); delete the file if that run is no longer active",
        path.display()
    )]
    Held { path: PathBuf, holder: String },

    #[error("Unable to create lock {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Top-level error for a synchronization run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_names_both_paths() {
        let error = CatalogError::DuplicateSourceFile {
            key: "clip.mp4".to_string(),
            first: PathBuf::from("/a/video/clip.mp4"),
            second: PathBuf::from("/b/video/clip.mp4"),
        };
        let text = error.to_string();
        assert!(text.contains("/a/video/clip.mp4"));
        assert!(text.contains("/b/video/clip.mp4"));
    }

    #[test]
    fn test_size_mismatch_display() {
        let error = DownloadError::SizeMismatch {
            expected: 100,
            actual: 99,
        };
        assert_eq!(
            error.to_string(),
            "Downloaded file size mismatch\n100 bytes on remote\n99 bytes locally"
        );
    }

    #[test]
    fn test_remote_error_wraps_into_sync_error() {
        let error: SyncError = RemoteError::NotFound {
            key: "abc".to_string(),
        }
        .into();
        assert!(matches!(error, SyncError::Remote(RemoteError::NotFound { .. })));
    }
}
