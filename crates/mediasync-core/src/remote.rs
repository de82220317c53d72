//! Boundary to the remote media hosting service.

use std::collections::BTreeMap;

use crate::error::RemoteError;
use crate::media::MediaRecord;
use crate::tags::{Tag, TagSet};

/// Query parameters for a listing, already flattened to wire names
/// (`statuses_filter`, `search:<field>`, ...).
pub type ListQuery = BTreeMap<String, String>;

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<MediaRecord>,
    /// Total matching records across all pages, when reported
    pub total: Option<u64>,
}

/// Fields to change on a remote record. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaUpdate {
    pub title: Option<String>,
    pub tags: Option<TagSet>,
    pub custom: BTreeMap<String, String>,
}

impl MediaUpdate {
    pub fn tags(tags: TagSet) -> Self {
        Self {
            tags: Some(tags),
            ..Self::default()
        }
    }

    pub fn custom(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut update = Self::default();
        update.custom.insert(name.into(), value.into());
        update
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.tags.is_none() && self.custom.is_empty()
    }

    /// Form parameters as the service expects them.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(title) = &self.title {
            params.push(("title".to_string(), title.clone()));
        }
        if let Some(tags) = &self.tags {
            params.push(("tags".to_string(), tags.to_wire()));
        }
        for (name, value) in &self.custom {
            params.push((format!("custom.{name}"), value.clone()));
        }
        params
    }
}

/// Operations the synchronization core needs from the hosting service.
pub trait MediaService: Send {
    /// Fetch one page of records matching `query`.
    fn list_page(&self, query: &ListQuery, offset: u64, limit: u64) -> Result<Page, RemoteError>;

    fn update_by_key(&self, key: &str, update: &MediaUpdate) -> Result<(), RemoteError>;

    /// Remove `tags` from the record. Must succeed without change when the
    /// record carries none of them.
    fn remove_tags_by_key(&self, key: &str, tags: &[Tag]) -> Result<(), RemoteError>;

    /// Where the uploaded original of `key` can be fetched from.
    fn original_uri(&self, key: &str) -> Result<String, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_params() {
        let mut update = MediaUpdate::custom("original_filename", "a.mp4");
        update.tags = Some(TagSet::parse("encoded,imported"));
        assert_eq!(
            update.to_params(),
            vec![
                ("tags".to_string(), "encoded,imported".to_string()),
                ("custom.original_filename".to_string(), "a.mp4".to_string()),
            ]
        );
        assert!(MediaUpdate::default().is_empty());
    }
}
