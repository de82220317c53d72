//! Content digests with a sidecar cache.
//!
//! Hashing multi-gigabyte media is slow, so the digest of `clip.mp4` is
//! stored in `clip.md5` (or `clip.sha256`) beside it and trusted on later
//! runs. The sidecar is never refreshed automatically: if the source
//! changes, delete its sidecar.

use std::cell::Cell;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

const READ_BUFFER: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Matches the digest the hosting service reports for originals
    #[default]
    Md5,
    Sha256,
}

impl HashAlgorithm {
    /// Extension of the sidecar cache file.
    pub fn extension(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    fn digest_reader<R: Read>(&self, mut reader: R) -> io::Result<String> {
        let mut buf = vec![0u8; READ_BUFFER];
        match self {
            HashAlgorithm::Md5 => {
                let mut ctx = md5::Context::new();
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    ctx.consume(&buf[..n]);
                }
                Ok(format!("{:x}", ctx.compute()))
            }
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(hex::encode(hasher.finalize()))
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
    computed: Cell<u64>,
}

impl ContentHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            computed: Cell::new(0),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Sidecar path: the source path with its extension replaced.
    pub fn cache_path(&self, path: &Path) -> PathBuf {
        path.with_extension(self.algorithm.extension())
    }

    /// How many digests were computed from file content (not read from a sidecar).
    pub fn computed(&self) -> u64 {
        self.computed.get()
    }

    /// Digest of `path`, from its sidecar when present.
    pub fn hash(&self, path: &Path) -> io::Result<String> {
        let cache_path = self.cache_path(path);

        match fs::read_to_string(&cache_path) {
            Ok(cached) => {
                let cached = cached.trim();
                if !cached.is_empty() {
                    return Ok(cached.to_string());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let digest = self.compute(path)?;
        fs::write(&cache_path, &digest)?;
        debug!(path = %path.display(), digest = %digest, "Cached content digest");
        Ok(digest)
    }

    /// Digest of `path` read from content, bypassing the sidecar.
    pub fn compute(&self, path: &Path) -> io::Result<String> {
        let file = File::open(path)?;
        let digest = self.algorithm.digest_reader(BufReader::new(file))?;
        self.computed.set(self.computed.get() + 1);
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_call_reads_sidecar() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        fs::write(&source, b"hello").unwrap();

        let hasher = ContentHasher::new(HashAlgorithm::Md5);
        let first = hasher.hash(&source).unwrap();
        let second = hasher.hash(&source).unwrap();

        assert_eq!(first, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(first, second);
        assert_eq!(hasher.computed(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("clip.md5")).unwrap(),
            first
        );
    }

    #[test]
    fn test_sidecar_is_trusted() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.mov");
        fs::write(&source, b"content").unwrap();
        fs::write(dir.path().join("clip.md5"), "abc123\n").unwrap();

        let hasher = ContentHasher::new(HashAlgorithm::Md5);
        assert_eq!(hasher.hash(&source).unwrap(), "abc123");
        assert_eq!(hasher.computed(), 0);
    }

    #[test]
    fn test_sha256_uses_own_extension() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("song.mp3");
        fs::write(&source, b"hello").unwrap();

        let hasher = ContentHasher::new(HashAlgorithm::Sha256);
        let digest = hasher.hash(&source).unwrap();
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(dir.path().join("song.sha256").exists());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let hasher = ContentHasher::default();
        assert!(hasher.hash(&dir.path().join("nope.mp4")).is_err());
        assert!(!dir.path().join("nope.md5").exists());
    }
}
