use std::collections::BTreeMap;

use tracing::info;

use crate::app::{RoutineReport, SyncContext, SyncRoutine};
use crate::error::Result;
use crate::media::MediaRecord;
use crate::tags::Tag;

/// Tags every upload of the same content but the earliest as `duplicate`.
///
/// Records are grouped by remote digest, or by original filename when the
/// service reports no digest.
#[derive(Debug, Default)]
pub struct FlagDuplicates;

fn identity(record: &MediaRecord) -> String {
    match record.md5.as_deref().map(str::trim) {
        Some(md5) if !md5.is_empty() => format!("md5:{}", md5.to_ascii_lowercase()),
        _ => format!("name:{}", record.original_filename()),
    }
}

impl SyncRoutine for FlagDuplicates {
    fn name(&self) -> &'static str {
        "flag-duplicates"
    }

    fn reset_tags(&self) -> Vec<Tag> {
        vec![Tag::Duplicate]
    }

    fn run(&mut self, ctx: &mut SyncContext) -> Result<RoutineReport> {
        let records = ctx.directory.snapshot()?;
        let mut report = RoutineReport {
            examined: records.len() as u64,
            ..RoutineReport::default()
        };

        let mut groups: BTreeMap<String, Vec<&MediaRecord>> = BTreeMap::new();
        for record in &records {
            if record.status().is_ignorable() {
                report.skipped += 1;
                continue;
            }
            groups.entry(identity(record)).or_default().push(record);
        }

        for (identity, mut group) in groups {
            if group.len() < 2 {
                continue;
            }
            group.sort_by_key(|r| (r.date().unwrap_or(i64::MAX), r.key.clone()));
            let (kept, rest) = group.split_at(1);
            info!(identity = %identity, kept = %kept[0].key, copies = rest.len(), "Found duplicate uploads");

            for record in rest {
                ctx.cancel.check()?;
                match ctx.directory.add_tags_by_key(&record.key, &[Tag::Duplicate]) {
                    Ok(true) => report.updated += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => report.fail(&record.key, &e),
                }
            }
        }

        if report.updated > 0 {
            ctx.directory.invalidate();
        }
        Ok(report)
    }
}
