//! Cached view of the remote media library for one run.
//!
//! The listing is fetched once and reused until `invalidate` is called.
//! Anything that changes tags or metadata must invalidate before the next
//! read so later steps in the same run see their effect.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::RemoteError;
use crate::filters::FilterSet;
use crate::media::MediaRecord;
use crate::remote::{ListQuery, MediaService, MediaUpdate};
use crate::tags::Tag;

/// Page size requested from the service unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: u64 = 1000;

pub type MediaMap = BTreeMap<String, MediaRecord>;

pub struct MediaDirectory {
    service: Box<dyn MediaService>,
    search_filters: FilterSet,
    exclusion_filters: FilterSet,
    page_size: u64,
    cache: Option<MediaMap>,
    fetches: u64,
}

impl MediaDirectory {
    pub fn new(service: Box<dyn MediaService>) -> Self {
        Self {
            service,
            search_filters: FilterSet::new(),
            exclusion_filters: FilterSet::new(),
            page_size: DEFAULT_PAGE_SIZE,
            cache: None,
            fetches: 0,
        }
    }

    pub fn with_search_filters(mut self, filters: FilterSet) -> Self {
        self.search_filters = filters;
        self
    }

    pub fn with_exclusion_filters(mut self, filters: FilterSet) -> Self {
        self.exclusion_filters = filters;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn add_search_filter(&mut self, term: impl Into<String>, field: impl Into<String>) {
        self.search_filters.add(term, field);
    }

    pub fn add_exclusion_filter(&mut self, term: impl Into<String>, field: impl Into<String>) {
        self.exclusion_filters.add(term, field);
    }

    pub fn service(&self) -> &dyn MediaService {
        self.service.as_ref()
    }

    /// Number of times the listing was actually fetched from the service.
    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Query for a listing: defaults, then search filters, then `overrides`.
    pub fn query(&self, overrides: &ListQuery) -> ListQuery {
        let mut query = ListQuery::new();
        query.insert("statuses_filter".to_string(), "ready".to_string());
        query.extend(self.search_filters.to_query());
        query.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        query
    }

    /// All matching records keyed by remote key, fetched on first use.
    ///
    /// `overrides` only take effect on the call that populates the cache.
    pub fn list(&mut self, overrides: &ListQuery) -> Result<&MediaMap, RemoteError> {
        if self.cache.is_none() {
            let query = self.query(overrides);
            let records = self.fetch_all(&query)?;
            self.cache = Some(records);
        }
        Ok(self.cache.get_or_insert_with(MediaMap::new))
    }

    /// `list` with no overrides.
    pub fn media(&mut self) -> Result<&MediaMap, RemoteError> {
        self.list(&ListQuery::new())
    }

    /// Owned copy of the current listing, for routines that mutate while iterating.
    pub fn snapshot(&mut self) -> Result<Vec<MediaRecord>, RemoteError> {
        Ok(self.media()?.values().cloned().collect())
    }

    pub fn invalidate(&mut self) {
        if self.cache.take().is_some() {
            debug!("Media cache invalidated");
        }
    }

    fn fetch_all(&mut self, query: &ListQuery) -> Result<MediaMap, RemoteError> {
        let mut records = MediaMap::new();
        let mut offset = 0u64;
        let mut excluded = 0u64;

        loop {
            let page = self.service.list_page(query, offset, self.page_size)?;
            let fetched = page.records.len() as u64;

            for record in page.records {
                if self.exclusion_filters.excludes(&record) {
                    excluded += 1;
                    continue;
                }
                records.insert(record.key.clone(), record);
            }

            offset += fetched;
            // The service may cap the page below the requested limit, so a
            // short page only ends the listing when no total is reported.
            let done = match page.total {
                Some(total) => fetched == 0 || offset >= total,
                None => fetched < self.page_size,
            };
            if done {
                break;
            }
        }

        self.fetches += 1;
        info!(
            count = records.len(),
            excluded, "Loaded media listing from remote service"
        );
        Ok(records)
    }

    pub fn update_by_key(&mut self, key: &str, update: &MediaUpdate) -> Result<(), RemoteError> {
        if update.is_empty() {
            return Ok(());
        }
        debug!(key, "Updating media metadata");
        self.service.update_by_key(key, update)
    }

    /// Remove `tags` from a record. A record carrying none of them is left
    /// untouched and `false` is returned.
    pub fn remove_tags_by_key(&mut self, key: &str, tags: &[Tag]) -> Result<bool, RemoteError> {
        if let Some(record) = self.cache.as_ref().and_then(|c| c.get(key)) {
            if !record.tags.contains_any(tags) {
                return Ok(false);
            }
        }
        debug!(key, tags = %crate::tags::describe(tags), "Removing tags");
        self.service.remove_tags_by_key(key, tags)?;
        Ok(true)
    }

    /// Add `tags` to a cached record, keeping every tag it already has.
    /// Returns `false` when the record already carried all of them.
    pub fn add_tags_by_key(&mut self, key: &str, tags: &[Tag]) -> Result<bool, RemoteError> {
        let current = match self.cache.as_ref().and_then(|c| c.get(key)) {
            Some(record) => record.tags.clone(),
            None => {
                return Err(RemoteError::NotFound {
                    key: key.to_string(),
                })
            }
        };
        let updated = current.with(tags);
        if updated == current {
            return Ok(false);
        }
        debug!(key, tags = %crate::tags::describe(tags), "Adding tags");
        self.service.update_by_key(key, &MediaUpdate::tags(updated))?;
        Ok(true)
    }
}
