//! Synchronization jobs run by the CLI subcommands.
//!
//! Each routine contains failures per asset: one bad record is logged and
//! counted, and the rest of the library is still processed. Errors from
//! listing the library or walking the source tree still end the run.

mod duplicates;
mod original_filenames;
mod purge;
mod recover;
mod validate;

pub use duplicates::FlagDuplicates;
pub use original_filenames::SetOriginalFilenames;
pub use purge::PurgeDeleted;
pub use recover::RecoverOriginals;
pub use validate::{Check, ValidateRoutine};

use std::path::{Path, PathBuf};

use crate::media::MediaRecord;

/// A remote filename made safe to use as one local path component.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// Where recover-originals places the original of `record`:
/// `<download root>/<key>/<original filename>`. `None` when the filename
/// sanitizes to nothing.
pub(crate) fn recovered_path(download_root: &Path, record: &MediaRecord) -> Option<PathBuf> {
    let filename = sanitize_filename(&record.original_filename());
    if filename.is_empty() {
        return None;
    }
    Some(download_root.join(&record.key).join(filename))
}
