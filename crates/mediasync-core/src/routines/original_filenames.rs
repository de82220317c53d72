use crate::app::{RoutineReport, SyncContext, SyncRoutine};
use crate::error::Result;

/// Backfills `original_filename` from the title on records that lack one.
#[derive(Debug, Default)]
pub struct SetOriginalFilenames;

impl SyncRoutine for SetOriginalFilenames {
    fn name(&self) -> &'static str {
        "set-original-filenames"
    }

    fn run(&mut self, ctx: &mut SyncContext) -> Result<RoutineReport> {
        let examined = ctx.directory.media()?.len() as u64;
        let updated = ctx.set_original_filenames()? as u64;
        Ok(RoutineReport {
            examined,
            updated,
            skipped: examined - updated,
            failed: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ORIGINAL_FILENAME;
    use crate::routines::testing::{context, record, MemoryService};
    use tempfile::tempdir;

    #[test]
    fn test_backfills_trimmed_title() {
        let dir = tempdir().unwrap();
        let mut named = record("k2", "Renamed", "");
        named.custom.insert(ORIGINAL_FILENAME.to_string(), "upload.mp4".to_string());
        let service = MemoryService::with(vec![record("k1", "  lecture.mp4\n", ""), named]);

        let mut ctx = context(&service, dir.path());
        let report = SetOriginalFilenames.run(&mut ctx).unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            service.record("k1").custom.get(ORIGINAL_FILENAME).map(String::as_str),
            Some("lecture.mp4")
        );
        assert_eq!(
            service.record("k2").custom.get(ORIGINAL_FILENAME).map(String::as_str),
            Some("upload.mp4")
        );
        assert_eq!(ctx.directory.fetch_count(), 1);
        assert!(!ctx.directory.is_cached());
    }

    #[test]
    fn test_noop_keeps_cache() {
        let dir = tempdir().unwrap();
        let mut named = record("k1", "x", "");
        named.custom.insert(ORIGINAL_FILENAME.to_string(), "x.mp4".to_string());
        let service = MemoryService::with(vec![named]);

        let mut ctx = context(&service, dir.path());
        assert_eq!(ctx.set_original_filenames().unwrap(), 0);
        assert!(ctx.directory.is_cached());
    }
}
