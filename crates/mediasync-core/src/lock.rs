//! Exclusive lock preventing overlapping runs against one library.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::LockError;

/// Held for the duration of a run; the lock file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// File name for a lock, namespaced by instance when one is active.
    pub fn file_name(instance: Option<&str>) -> String {
        match instance {
            Some(name) => format!("mediasync-{name}.lock"),
            None => "mediasync.lock".to_string(),
        }
    }

    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LockError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        let mut reclaimed = false;
        let mut file = loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(&path)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default();
                    if reclaimed || !holder_is_gone(&holder) {
                        return Err(LockError::Held { path, holder });
                    }
                    warn!(path = %path.display(), holder = %holder, "Reclaiming stale run lock");
                    fs::remove_file(&path).map_err(|source| LockError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    reclaimed = true;
                }
                Err(source) => return Err(LockError::Io { path, source }),
            }
        };

        let holder = format!("pid {} since {}", std::process::id(), Utc::now().to_rfc3339());
        file.write_all(holder.as_bytes())
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "Acquired run lock");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses the pid out of a `pid N since ...` holder line.
fn holder_pid(holder: &str) -> Option<u32> {
    holder.strip_prefix("pid ")?.split_whitespace().next()?.parse().ok()
}

/// True only when the holding process is known to have exited. Without a
/// process table to consult the lock is always treated as live.
fn holder_is_gone(holder: &str) -> bool {
    let Some(pid) = holder_pid(holder) else {
        return false;
    };
    if pid == std::process::id() {
        return false;
    }
    let proc_root = Path::new("/proc");
    proc_root.join("self").exists() && !proc_root.join(pid.to_string()).exists()
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Released run lock"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Unable to release run lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(RunLock::file_name(Some("site")));

        let lock = RunLock::acquire(&path).unwrap();
        match RunLock::acquire(&path) {
            Err(LockError::Held { holder, .. }) => assert!(holder.starts_with("pid ")),
            other => panic!("expected held lock, got {other:?}"),
        }

        drop(lock);
        assert!(!path.exists());
        assert!(RunLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_held_message_names_lock_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mediasync.lock");
        let _lock = RunLock::acquire(&path).unwrap();

        let message = RunLock::acquire(&path).unwrap_err().to_string();
        assert!(message.contains(&path.display().to_string()));
        assert!(message.contains("delete"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_lock_left_by_exited_process_is_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mediasync.lock");
        // above the kernel's pid_max, so no such process exists
        fs::write(&path, "pid 999999999 since 2026-01-01T00:00:00+00:00").unwrap();

        let lock = RunLock::acquire(&path).unwrap();
        let holder = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(holder_pid(&holder), Some(std::process::id()));
    }

    #[test]
    fn test_unparseable_holder_is_never_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mediasync.lock");
        fs::write(&path, "garbage").unwrap();

        assert!(matches!(RunLock::acquire(&path), Err(LockError::Held { .. })));
        assert!(path.exists());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(RunLock::file_name(None), "mediasync.lock");
        assert_eq!(RunLock::file_name(Some("a")), "mediasync-a.lock");
    }
}
