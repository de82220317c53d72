//! Catalog of local source media.
//!
//! Walks the source tree once per run and indexes candidate files by file
//! name. The file name is the asset's identity, so two files with the same
//! name anywhere in the tree is a hard error.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{CatalogError, SourceFileError};
use crate::hasher::ContentHasher;
use crate::{ProgressCallback, ThrottledProgress};

/// Container formats we upload.
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "m4a", "mp3"];

/// Only files directly inside one of these directories are considered.
pub const MEDIA_DIRECTORIES: &[&str] = &["video", "videos", "samples", "video-extras"];

/// Dot-files, AppleDouble forks and other OS droppings.
static SKIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\..*|Thumbs\.db|desktop\.ini)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File name, unique across the tree
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    /// Content digest, `None` when the catalog was built without hashing
    pub hash: Option<String>,
}

/// What to do after a single file fails to catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    #[default]
    Continue,
    Abort,
}

#[derive(Debug, Default)]
pub struct CatalogReport {
    pub entries: BTreeMap<String, SourceFile>,
    pub failures: Vec<SourceFileError>,
}

type FailureHandler = Box<dyn FnMut(&SourceFileError) + Send>;

pub struct SourceFileCatalog {
    root: PathBuf,
    hasher: ContentHasher,
    compute_hashes: bool,
    policy: ErrorPolicy,
    on_failure: Option<FailureHandler>,
    report: Option<CatalogReport>,
}

impl SourceFileCatalog {
    pub fn new(root: impl Into<PathBuf>, hasher: ContentHasher) -> Self {
        Self {
            root: root.into(),
            hasher,
            compute_hashes: true,
            policy: ErrorPolicy::Continue,
            on_failure: None,
            report: None,
        }
    }

    /// Skip content hashing; entries then carry `hash: None`.
    pub fn with_hashes(mut self, compute_hashes: bool) -> Self {
        self.compute_hashes = compute_hashes;
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Called for each file that fails to catalog. Without one, failures are
    /// only collected into the report.
    pub fn on_failure(mut self, handler: impl FnMut(&SourceFileError) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(handler));
        self
    }

    pub fn set_compute_hashes(&mut self, compute_hashes: bool) {
        if compute_hashes && !self.compute_hashes {
            // entries built without digests are no longer good enough
            self.report = None;
        }
        self.compute_hashes = compute_hashes;
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hasher(&self) -> &ContentHasher {
        &self.hasher
    }

    /// Catalog entries keyed by file name, scanned on first use.
    pub fn entries(&mut self) -> Result<&BTreeMap<String, SourceFile>, CatalogError> {
        self.entries_with_progress(&|stage, current, total, file| {
            debug!(stage, current = current + 1, total, file, "Cataloging source files")
        })
    }

    pub fn entries_with_progress(
        &mut self,
        progress: &ProgressCallback<'_>,
    ) -> Result<&BTreeMap<String, SourceFile>, CatalogError> {
        Ok(&self.report_with_progress(progress)?.entries)
    }

    pub fn report_with_progress(
        &mut self,
        progress: &ProgressCallback<'_>,
    ) -> Result<&CatalogReport, CatalogError> {
        if self.report.is_none() {
            let report = self.scan(progress)?;
            self.report = Some(report);
        }
        Ok(self.report.get_or_insert_with(CatalogReport::default))
    }

    /// Drop the memoized scan so the next read walks the tree again.
    pub fn invalidate(&mut self) {
        self.report = None;
    }

    fn scan(&mut self, progress: &ProgressCallback<'_>) -> Result<CatalogReport, CatalogError> {
        let tp = ThrottledProgress::new(progress);
        let mut report = CatalogReport::default();

        if !self.root.is_dir() {
            return Err(CatalogError::Root {
                path: self.root.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            });
        }

        // Phase 1: collect candidates
        let root = self.root.clone();
        let mut candidates: Vec<(String, PathBuf)> = Vec::new();
        let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();
        for entry in WalkDir::new(&root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    let key = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("filesystem loop"));
                    self.fail(&mut report, SourceFileError { key, path, source })?;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let key = entry.file_name().to_string_lossy().into_owned();
            if !is_candidate(entry.path(), &key) {
                continue;
            }
            // Checked here so a file that later fails to stat or hash still counts
            let path = entry.into_path();
            if let Some(first) = seen.get(&key) {
                return Err(CatalogError::DuplicateSourceFile {
                    key,
                    first: first.clone(),
                    second: path,
                });
            }
            seen.insert(key.clone(), path.clone());
            candidates.push((key, path));
        }

        // Phase 2: stat and hash
        let total = candidates.len() as u64;
        for (i, (key, path)) in candidates.into_iter().enumerate() {
            tp.report("catalog", i as u64, total, &key);

            match self.catalog_file(&key, &path) {
                Ok(file) => {
                    report.entries.insert(key, file);
                }
                Err(source) => {
                    self.fail(&mut report, SourceFileError { key, path, source })?;
                }
            }
        }

        info!(
            root = %self.root.display(),
            files = report.entries.len(),
            failures = report.failures.len(),
            "Cataloged source files"
        );
        Ok(report)
    }

    fn catalog_file(&self, key: &str, path: &Path) -> io::Result<SourceFile> {
        let size = path.metadata()?.len();
        let hash = if self.compute_hashes {
            Some(self.hasher.hash(path)?)
        } else {
            None
        };
        Ok(SourceFile {
            key: key.to_string(),
            path: path.to_path_buf(),
            size,
            hash,
        })
    }

    fn fail(&mut self, report: &mut CatalogReport, error: SourceFileError) -> Result<(), CatalogError> {
        if let Some(handler) = self.on_failure.as_mut() {
            handler(&error);
        } else {
            debug!(error = %error, "Skipping source file");
        }
        match self.policy {
            ErrorPolicy::Continue => {
                report.failures.push(error);
                Ok(())
            }
            ErrorPolicy::Abort => {
                warn!(error = %error, "Aborting catalog scan");
                Err(error.into())
            }
        }
    }
}

/// Accepted when the name is not OS metadata, the extension is a media
/// container, and the immediate parent directory is a media directory.
pub fn is_candidate(path: &Path, file_name: &str) -> bool {
    if SKIP_RE.is_match(file_name) {
        return false;
    }

    let extension_ok = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MEDIA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));

    let directory_ok = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .is_some_and(|n| MEDIA_DIRECTORIES.contains(&n));

    extension_ok && directory_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::HashAlgorithm;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, body: &[u8]) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_candidate_rules() {
        assert!(is_candidate(Path::new("/m/course/video/a.mp4"), "a.mp4"));
        assert!(is_candidate(Path::new("/m/video-extras/a.M4V"), "a.M4V"));
        assert!(!is_candidate(Path::new("/m/course/docs/a.mp4"), "a.mp4"));
        assert!(!is_candidate(Path::new("/m/video/a.txt"), "a.txt"));
        assert!(!is_candidate(Path::new("/m/video/._a.mp4"), "._a.mp4"));
        assert!(!is_candidate(Path::new("/m/video/.DS_Store"), ".DS_Store"));
        assert!(!is_candidate(Path::new("/m/video/a.md5"), "a.md5"));
    }

    #[test]
    fn test_scan_indexes_by_file_name() {
        let dir = tempdir().unwrap();
        write(dir.path(), "c1/video/one.mp4", b"one");
        write(dir.path(), "c2/samples/two.mp3", b"two!");
        write(dir.path(), "c2/notes/three.mp4", b"skip");

        let mut catalog = SourceFileCatalog::new(dir.path(), ContentHasher::new(HashAlgorithm::Md5));
        let entries = catalog.entries().unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["one.mp4", "two.mp3"]);
        assert_eq!(entries["two.mp3"].size, 4);
        assert!(entries["one.mp4"].hash.is_some());
        assert!(dir.path().join("c1/video/one.md5").exists());
    }

    #[test]
    fn test_duplicate_key_is_fatal() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a/video/same.mp4", b"1");
        write(dir.path(), "b/videos/same.mp4", b"2");

        let mut catalog = SourceFileCatalog::new(dir.path(), ContentHasher::default()).with_hashes(false);
        match catalog.entries() {
            Err(CatalogError::DuplicateSourceFile { key, first, second }) => {
                assert_eq!(key, "same.mp4");
                assert_ne!(first, second);
            }
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_key_is_fatal_when_copies_fail_to_hash() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a/video/clip.mp4", b"1");
        write(dir.path(), "b/video/clip.mp4", b"2");
        // a directory where the sidecar belongs makes hashing fail
        fs::create_dir_all(dir.path().join("a/video/clip.md5")).unwrap();
        fs::create_dir_all(dir.path().join("b/video/clip.md5")).unwrap();

        let mut catalog = SourceFileCatalog::new(dir.path(), ContentHasher::new(HashAlgorithm::Md5));
        match catalog.entries() {
            Err(CatalogError::DuplicateSourceFile { key, .. }) => assert_eq!(key, "clip.mp4"),
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn test_scan_is_memoized() {
        let dir = tempdir().unwrap();
        write(dir.path(), "video/a.mp4", b"a");
        let mut catalog = SourceFileCatalog::new(dir.path(), ContentHasher::default());
        assert_eq!(catalog.entries().unwrap().len(), 1);
        write(dir.path(), "video/b.mp4", b"b");
        assert_eq!(catalog.entries().unwrap().len(), 1);
        catalog.invalidate();
        assert_eq!(catalog.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_progress_callback_may_borrow_locals() {
        let dir = tempdir().unwrap();
        write(dir.path(), "video/a.mp4", b"a");
        write(dir.path(), "video/b.mp4", b"b");

        let files = std::cell::RefCell::new(Vec::new());
        let mut catalog = SourceFileCatalog::new(dir.path(), ContentHasher::default()).with_hashes(false);
        catalog
            .entries_with_progress(&|_, _, _, file| files.borrow_mut().push(file.to_string()))
            .unwrap();
        assert_eq!(files.into_inner().last().map(String::as_str), Some("b.mp4"));
    }

    #[test]
    fn test_missing_root() {
        let dir = tempdir().unwrap();
        let mut catalog = SourceFileCatalog::new(dir.path().join("absent"), ContentHasher::default());
        assert!(matches!(catalog.entries(), Err(CatalogError::Root { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_contained() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        write(dir.path(), "video/good.mp4", b"good");
        let bad = write(dir.path(), "video/bad.mp4", b"bad");
        fs::set_permissions(&bad, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read(&bad).is_ok() {
            // running as root, permissions are not enforced
            return;
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut catalog = SourceFileCatalog::new(dir.path(), ContentHasher::default())
            .on_failure(move |e| sink.lock().unwrap().push(e.key.clone()));
        let report = catalog.report_with_progress(&|_, _, _, _| {}).unwrap();
        assert_eq!(report.entries.keys().collect::<Vec<_>>(), vec!["good.mp4"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["bad.mp4".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_abort_policy_stops_scan() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let bad = write(dir.path(), "video/bad.mp4", b"bad");
        fs::set_permissions(&bad, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read(&bad).is_ok() {
            return;
        }

        let mut catalog = SourceFileCatalog::new(dir.path(), ContentHasher::default())
            .with_policy(ErrorPolicy::Abort);
        assert!(matches!(catalog.entries(), Err(CatalogError::SourceFile(_))));
    }
}
