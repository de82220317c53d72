use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info};

use crate::app::{RoutineReport, SyncContext, SyncRoutine};
use crate::error::Result;
use crate::tags::Tag;

/// Removes local sources of assets marked `delete` on the remote, then tags
/// them `original.deleted` so later runs leave them alone.
#[derive(Debug, Default)]
pub struct PurgeDeleted {
    dry_run: bool,
}

impl PurgeDeleted {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl SyncRoutine for PurgeDeleted {
    fn name(&self) -> &'static str {
        "purge-deleted"
    }

    fn run(&mut self, ctx: &mut SyncContext) -> Result<RoutineReport> {
        let algorithm = ctx.catalog.hasher().algorithm();
        let records = ctx.directory.snapshot()?;
        let sources = ctx.catalog.entries()?;
        let mut report = RoutineReport::default();
        let mut removed = 0u64;

        for record in &records {
            ctx.cancel.check()?;
            report.examined += 1;

            let status = record.status();
            if !status.is_marked_deleted() || status.original_deleted {
                report.skipped += 1;
                continue;
            }

            let source = sources.get(&record.original_filename());
            if self.dry_run {
                match source {
                    Some(file) => info!(key = %record.key, path = %file.path.display(), "Would delete source file"),
                    None => info!(key = %record.key, "Would tag deleted media without a local source"),
                }
                report.skipped += 1;
                continue;
            }

            if let Some(file) = source {
                if let Err(e) = remove_if_present(&file.path) {
                    report.fail(&record.key, &e);
                    continue;
                }
                let sidecar = file.path.with_extension(algorithm.extension());
                if let Err(e) = remove_if_present(&sidecar) {
                    debug!(path = %sidecar.display(), error = %e, "Unable to remove digest sidecar");
                }
                removed += 1;
                info!(key = %record.key, path = %file.path.display(), "Deleted source file");
            }

            match ctx.directory.add_tags_by_key(&record.key, &[Tag::OriginalDeleted]) {
                Ok(_) => report.updated += 1,
                Err(e) => report.fail(&record.key, &e),
            }
        }

        if removed > 0 {
            ctx.catalog.invalidate();
        }
        if report.updated > 0 {
            ctx.directory.invalidate();
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routines::testing::{context, record, write, MemoryService};
    use tempfile::tempdir;

    #[test]
    fn test_purges_deleted_sources_and_sidecars() {
        let dir = tempdir().unwrap();
        let service = MemoryService::with(vec![
            record("k1", "gone.mp4", "delete"),
            record("k2", "kept.mp4", ""),
            record("k3", "done.mp4", "delete,original.deleted"),
        ]);
        let mut ctx = context(&service, dir.path());
        let root = ctx.config.source_root();
        write(&root, "c/video/gone.mp4", b"x");
        write(&root, "c/video/gone.md5", b"digest");
        write(&root, "c/video/kept.mp4", b"y");
        write(&root, "c/video/done.mp4", b"z");

        let report = PurgeDeleted::new(false).run(&mut ctx).unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 2);
        assert!(!root.join("c/video/gone.mp4").exists());
        assert!(!root.join("c/video/gone.md5").exists());
        assert!(root.join("c/video/kept.mp4").exists());
        assert!(root.join("c/video/done.mp4").exists());
        assert!(service.tags("k1").contains(Tag::OriginalDeleted));
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let dir = tempdir().unwrap();
        let service = MemoryService::with(vec![record("k1", "gone.mp4", "delete")]);
        let mut ctx = context(&service, dir.path());
        let root = ctx.config.source_root();
        write(&root, "video/gone.mp4", b"x");

        let report = PurgeDeleted::new(true).run(&mut ctx).unwrap();

        assert_eq!(report.updated, 0);
        assert!(root.join("video/gone.mp4").exists());
        assert_eq!(service.tags("k1").to_wire(), "delete");
    }
}
