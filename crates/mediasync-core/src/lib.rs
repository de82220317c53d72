pub mod app;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod directory;
pub mod download;
pub mod error;
pub mod filters;
pub mod hasher;
pub mod http;
pub mod lock;
pub mod media;
pub mod remote;
pub mod routines;
pub mod status;
pub mod tags;

use std::cell::Cell;
use std::time::{Duration, Instant};

pub use app::{RoutineReport, RunReport, SyncApplication, SyncContext, SyncRoutine};
pub use cancel::CancellationToken;
pub use catalog::{ErrorPolicy, SourceFile, SourceFileCatalog};
pub use config::SyncConfig;
pub use directory::MediaDirectory;
pub use download::{DownloadPipeline, LocalFiles, ResourceFetcher};
pub use error::{CatalogError, DownloadError, RemoteError, SyncError};
pub use hasher::{ContentHasher, HashAlgorithm};
pub use http::HttpMediaService;
pub use media::MediaRecord;
pub use remote::{MediaService, MediaUpdate};
pub use status::{Disposition, MediaStatus, Validation};
pub use tags::{Tag, TagSet};

/// Type alias for progress callback
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + 'a;

/// Throttled progress reporter: emits at most every 200ms, and always on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Cell<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        let start = Instant::now()
            .checked_sub(Duration::from_secs(1))
            .unwrap_or_else(Instant::now);
        Self {
            inner,
            last_emit: Cell::new(start),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            if self.last_emit.get().elapsed() < Duration::from_millis(200) {
                return;
            }
            self.last_emit.set(Instant::now());
        }
        (self.inner)(stage, current, total, message);
    }
}
