use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info};

use crate::app::{RoutineReport, SyncContext, SyncRoutine};
use crate::catalog::SourceFile;
use crate::error::{ConfigError, Result};
use crate::hasher::{ContentHasher, HashAlgorithm};
use crate::media::MediaRecord;
use crate::routines::recovered_path;
use crate::status::Disposition;
use crate::tags::Tag;

/// What a validation pass compares between the remote record and the local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Filesize,
    Md5,
}

impl Check {
    fn valid_tag(self) -> Tag {
        match self {
            Check::Filesize => Tag::ValidatedFilesize,
            Check::Md5 => Tag::ValidatedMd5,
        }
    }

    fn invalid_tag(self) -> Tag {
        match self {
            Check::Filesize => Tag::InvalidFilesize,
            Check::Md5 => Tag::InvalidMd5,
        }
    }
}

enum Outcome {
    Matches,
    Differs,
    /// Nothing to compare against on the remote side
    Unknown,
}

/// Tags each remote record valid or invalid by comparing it with its local source file.
pub struct ValidateRoutine {
    check: Check,
}

impl ValidateRoutine {
    pub fn new(check: Check) -> Self {
        Self { check }
    }

    pub fn sizes() -> Self {
        Self::new(Check::Filesize)
    }

    pub fn hashes() -> Self {
        Self::new(Check::Md5)
    }

    fn compare(&self, record: &MediaRecord, source: &SourceFile) -> Outcome {
        match self.check {
            Check::Filesize => match record.size {
                Some(size) if size == source.size => Outcome::Matches,
                Some(_) => Outcome::Differs,
                None => Outcome::Unknown,
            },
            Check::Md5 => match (&record.md5, &source.hash) {
                (Some(remote), Some(local)) if remote.eq_ignore_ascii_case(local) => Outcome::Matches,
                (Some(_), Some(_)) => Outcome::Differs,
                _ => Outcome::Unknown,
            },
        }
    }
}

impl ValidateRoutine {
    /// The copy recover-originals left in the download tree, standing in
    /// for a source file that is not in the catalog.
    fn recovered_source(
        &self,
        download_root: &Path,
        record: &MediaRecord,
        hasher: &ContentHasher,
    ) -> io::Result<Option<SourceFile>> {
        let Some(path) = recovered_path(download_root, record) else {
            return Ok(None);
        };
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let hash = match self.check {
            Check::Md5 => Some(hasher.hash(&path)?),
            Check::Filesize => None,
        };
        debug!(key = %record.key, path = %path.display(), "Validating against recovered original");
        Ok(Some(SourceFile {
            key: record.original_filename(),
            path,
            size: metadata.len(),
            hash,
        }))
    }
}

impl SyncRoutine for ValidateRoutine {
    fn name(&self) -> &'static str {
        match self.check {
            Check::Filesize => "validate-sizes",
            Check::Md5 => "validate-hashes",
        }
    }

    fn reset_tags(&self) -> Vec<Tag> {
        match self.check {
            Check::Filesize => vec![Tag::ValidatedFilesize, Tag::InvalidFilesize, Tag::OriginalMissing],
            Check::Md5 => vec![Tag::ValidatedMd5, Tag::InvalidMd5],
        }
    }

    fn needs_hashes(&self) -> bool {
        self.check == Check::Md5
    }

    fn run(&mut self, ctx: &mut SyncContext) -> Result<RoutineReport> {
        if self.check == Check::Md5 && ctx.catalog.hasher().algorithm() != HashAlgorithm::Md5 {
            return Err(ConfigError::Invalid(
                "validate-hashes compares md5 digests; set hash_algorithm to md5".to_string(),
            )
            .into());
        }

        let download_root = ctx.config.download_root();
        let hasher = ContentHasher::new(ctx.catalog.hasher().algorithm());
        let records = ctx.directory.snapshot()?;
        let sources = ctx.catalog.entries()?;
        let mut report = RoutineReport::default();

        for record in &records {
            ctx.cancel.check()?;
            report.examined += 1;

            let status = record.status();
            if matches!(
                status.disposition(),
                Disposition::Deletable | Disposition::Ignorable | Disposition::OriginalMissing
            ) || record.tags.contains_any(&[self.check.valid_tag(), self.check.invalid_tag()])
            {
                report.skipped += 1;
                continue;
            }

            let recovered;
            let source = match sources.get(&record.original_filename()) {
                Some(source) => Some(source),
                None => match self.recovered_source(&download_root, record, &hasher) {
                    Ok(found) => {
                        recovered = found;
                        recovered.as_ref()
                    }
                    Err(e) => {
                        report.fail(&record.key, &e);
                        continue;
                    }
                },
            };

            let tag = match source {
                None => Tag::OriginalMissing,
                Some(source) => match self.compare(record, source) {
                    Outcome::Matches => self.check.valid_tag(),
                    Outcome::Differs => self.check.invalid_tag(),
                    Outcome::Unknown => {
                        debug!(key = %record.key, "No remote value to compare");
                        report.skipped += 1;
                        continue;
                    }
                },
            };

            match ctx.directory.add_tags_by_key(&record.key, &[tag]) {
                Ok(true) => {
                    info!(key = %record.key, tag = %tag, "Tagged media file");
                    report.updated += 1;
                }
                Ok(false) => report.skipped += 1,
                Err(e) => report.fail(&record.key, &e),
            }
        }

        if report.updated > 0 {
            ctx.directory.invalidate();
        }
        Ok(report)
    }
}
