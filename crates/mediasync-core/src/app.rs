//! Run orchestration: the run lock, the optional tag reset, then one routine.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::catalog::SourceFileCatalog;
use crate::config::SyncConfig;
use crate::directory::MediaDirectory;
use crate::download::{DownloadPipeline, ResourceFetcher};
use crate::error::Result;
use crate::hasher::ContentHasher;
use crate::lock::RunLock;
use crate::media::ORIGINAL_FILENAME;
use crate::remote::{MediaService, MediaUpdate};
use crate::tags::{describe, Tag};

/// Everything a routine works against during one run.
pub struct SyncContext {
    pub config: SyncConfig,
    pub directory: MediaDirectory,
    pub catalog: SourceFileCatalog,
    pub pipeline: DownloadPipeline,
    pub fetcher: Box<dyn ResourceFetcher>,
    pub cancel: CancellationToken,
}

impl SyncContext {
    pub fn new(
        config: SyncConfig,
        service: Box<dyn MediaService>,
        fetcher: Box<dyn ResourceFetcher>,
    ) -> Self {
        let directory = MediaDirectory::new(service)
            .with_search_filters(config.search_filters.clone())
            .with_exclusion_filters(config.exclusion_filters.clone())
            .with_page_size(config.page_size);

        let hasher = ContentHasher::new(config.hash_algorithm);
        let catalog = SourceFileCatalog::new(config.source_root(), hasher)
            .with_hashes(false)
            .on_failure(|e| {
                warn!(
                    key = %e.key,
                    path = %e.path.display(),
                    error = %e.source,
                    "Skipping unreadable source file"
                )
            });

        let pipeline = DownloadPipeline::new(config.scratch_dir());

        Self {
            config,
            directory,
            catalog,
            pipeline,
            fetcher,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Strip `tags` from every cached record that carries any of them, then
    /// invalidate the cache. Returns the number of records changed.
    pub fn reset_tags(&mut self, tags: &[Tag]) -> Result<usize> {
        if tags.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = self
            .directory
            .media()?
            .values()
            .filter(|r| r.tags.contains_any(tags))
            .map(|r| r.key.clone())
            .collect();

        let mut count = 0;
        let outcome: Result<()> = keys.iter().try_for_each(|key| {
            self.cancel.check()?;
            if self.directory.remove_tags_by_key(key, tags)? {
                count += 1;
            }
            Ok(())
        });

        // partial resets still changed remote state
        self.directory.invalidate();
        outcome?;

        info!("Reset {} tags for {} media files", describe(tags), count);
        Ok(count)
    }

    /// Record the trimmed title as `original_filename` on every cached record
    /// that has none. The cache is invalidated only when something changed.
    pub fn set_original_filenames(&mut self) -> Result<usize> {
        let pending: Vec<(String, String)> = self
            .directory
            .media()?
            .values()
            .filter(|r| !r.has_original_filename())
            .map(|r| (r.key.clone(), r.title.trim().to_string()))
            .collect();

        let mut count = 0;
        let outcome: Result<()> = pending.iter().try_for_each(|(key, name)| {
            self.cancel.check()?;
            self.directory
                .update_by_key(key, &MediaUpdate::custom(ORIGINAL_FILENAME, name.as_str()))?;
            count += 1;
            Ok(())
        });

        if count > 0 {
            self.directory.invalidate();
        }
        outcome?;

        info!("Set original filename for {} media files", count);
        Ok(count)
    }
}

/// Tally of what a routine did with the assets it looked at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoutineReport {
    pub examined: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl RoutineReport {
    /// Count a contained per-asset failure and log it.
    pub fn fail(&mut self, key: &str, error: &dyn fmt::Display) {
        self.failed += 1;
        warn!(key, error = %error, "Skipping media file");
    }
}

impl fmt::Display for RoutineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} examined, {} updated, {} skipped, {} failed",
            self.examined, self.updated, self.skipped, self.failed
        )
    }
}

/// One synchronization job.
pub trait SyncRoutine {
    fn name(&self) -> &'static str;

    /// Tags cleared when the run is started with tag reset enabled.
    fn reset_tags(&self) -> Vec<Tag> {
        Vec::new()
    }

    /// Whether the source catalog must carry content digests.
    fn needs_hashes(&self) -> bool {
        false
    }

    fn run(&mut self, ctx: &mut SyncContext) -> Result<RoutineReport>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub routine: &'static str,
    /// Records whose tags were cleared before the routine ran
    pub reset: usize,
    pub report: RoutineReport,
}

pub struct SyncApplication {
    ctx: SyncContext,
    reset_tags: bool,
}

impl SyncApplication {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            reset_tags: false,
        }
    }

    pub fn with_reset_tags(mut self, reset_tags: bool) -> Self {
        self.reset_tags = reset_tags;
        self
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SyncContext {
        &mut self.ctx
    }

    pub fn into_context(self) -> SyncContext {
        self.ctx
    }

    pub fn run(&mut self, routine: &mut dyn SyncRoutine) -> Result<RunReport> {
        let started = Instant::now();
        let _lock = RunLock::acquire(self.ctx.config.lock_path())?;
        info!(routine = routine.name(), instance = ?self.ctx.config.instance, "Starting run");

        self.ctx.cancel.check()?;
        self.ctx.catalog.set_compute_hashes(routine.needs_hashes());

        let reset = if self.reset_tags {
            self.ctx.reset_tags(&routine.reset_tags())?
        } else {
            0
        };

        let report = routine.run(&mut self.ctx)?;
        info!(
            routine = routine.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "All done: {report}"
        );

        Ok(RunReport {
            routine: routine.name(),
            reset,
            report,
        })
    }
}
