use std::fs;

use tracing::{info, warn};

use crate::app::{RoutineReport, SyncContext, SyncRoutine};
use crate::error::{DownloadError, Result};
use crate::routines::recovered_path;
use crate::tags::Tag;

/// Downloads the uploaded original of every imported asset whose local
/// source went missing, into `<download root>/<key>/<original filename>`.
#[derive(Debug, Default)]
pub struct RecoverOriginals;

impl SyncRoutine for RecoverOriginals {
    fn name(&self) -> &'static str {
        "recover-originals"
    }

    fn run(&mut self, ctx: &mut SyncContext) -> Result<RoutineReport> {
        let root = ctx.config.download_root();
        let records = ctx.directory.snapshot()?;
        let mut report = RoutineReport::default();
        let mut downloaded = 0u64;

        for record in &records {
            ctx.cancel.check()?;
            report.examined += 1;

            if !record.status().original_is_downloadable() {
                report.skipped += 1;
                continue;
            }

            let Some(destination) = recovered_path(&root, record) else {
                report.fail(&record.key, &"no usable original filename");
                continue;
            };

            let uri = match ctx.directory.service().original_uri(&record.key) {
                Ok(uri) => uri,
                Err(e) => {
                    report.fail(&record.key, &e);
                    continue;
                }
            };

            match ctx.pipeline.transfer(
                ctx.fetcher.as_ref(),
                &uri,
                &destination,
                Some(&record.key),
                record.size,
            ) {
                Ok(bytes) => {
                    downloaded += 1;
                    info!(key = %record.key, bytes, path = %destination.display(), "Recovered original");
                }
                Err(DownloadError::FileExists(path)) => {
                    // A previous run may have downloaded it without clearing the tag
                    let existing = fs::metadata(&path).map(|m| m.len()).ok();
                    if existing.is_none() || record.size.is_some_and(|size| Some(size) != existing) {
                        warn!(key = %record.key, path = %path.display(), "Different file already at destination");
                        report.skipped += 1;
                        continue;
                    }
                    info!(key = %record.key, path = %path.display(), "Original already downloaded");
                }
                Err(e) => {
                    report.fail(&record.key, &e);
                    continue;
                }
            }

            match ctx.directory.remove_tags_by_key(&record.key, &[Tag::OriginalMissing]) {
                Ok(_) => report.updated += 1,
                Err(e) => report.fail(&record.key, &e),
            }
        }

        if downloaded > 0 {
            ctx.catalog.invalidate();
        }
        if report.updated > 0 {
            ctx.directory.invalidate();
        }
        Ok(report)
    }
}
