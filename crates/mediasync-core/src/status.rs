//! Status of a remote asset, derived once from its tag set.
//!
//! "Not valid" is not "invalid": a record with neither kind of validation
//! tag is unvalidated. Any invalid tag vetoes any valid tag.

use crate::tags::{Tag, TagSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Unvalidated,
    Valid,
    Invalid,
}

/// The single state a routine should act on, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Disposition {
    Deletable,
    Ignorable,
    OriginalMissing,
    Invalid,
    Encoded,
    Valid,
    Unvalidated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaStatus {
    pub validation: Validation,
    pub encoded: bool,
    pub imported: bool,
    pub deleted: bool,
    pub ignored: bool,
    pub original_missing: bool,
    pub duplicate: bool,
    pub original_deleted: bool,
}

impl MediaStatus {
    pub fn from_tags(tags: &TagSet) -> Self {
        let has_valid = tags.contains_any(&[Tag::ValidatedFilesize, Tag::ValidatedMd5]);
        let has_invalid = tags.contains_any(&[Tag::InvalidFilesize, Tag::InvalidMd5]);

        let validation = if has_invalid {
            Validation::Invalid
        } else if has_valid {
            Validation::Valid
        } else {
            Validation::Unvalidated
        };

        Self {
            validation,
            encoded: tags.contains(Tag::Encoded),
            imported: tags.contains(Tag::Imported),
            deleted: tags.contains(Tag::Delete),
            ignored: tags.contains(Tag::Ignored),
            original_missing: tags.contains(Tag::OriginalMissing),
            duplicate: tags.contains(Tag::Duplicate),
            original_deleted: tags.contains(Tag::OriginalDeleted),
        }
    }

    pub fn is_marked_valid(&self) -> bool {
        self.validation == Validation::Valid
    }

    pub fn is_marked_invalid(&self) -> bool {
        self.validation == Validation::Invalid
    }

    pub fn is_marked_encoded(&self) -> bool {
        self.encoded
    }

    /// Legacy name: true for records tagged `ignored`.
    pub fn is_public(&self) -> bool {
        self.ignored
    }

    pub fn is_ignorable(&self) -> bool {
        self.deleted || self.ignored
    }

    pub fn is_marked_deleted(&self) -> bool {
        self.deleted
    }

    /// Only imported assets known to be missing locally and not marked for
    /// deletion have an original worth recovering.
    pub fn original_is_downloadable(&self) -> bool {
        !self.deleted && self.imported && self.original_missing
    }

    pub fn disposition(&self) -> Disposition {
        if self.deleted {
            Disposition::Deletable
        } else if self.ignored {
            Disposition::Ignorable
        } else if self.original_missing {
            Disposition::OriginalMissing
        } else if self.is_marked_invalid() {
            Disposition::Invalid
        } else if self.encoded {
            Disposition::Encoded
        } else if self.is_marked_valid() {
            Disposition::Valid
        } else {
            Disposition::Unvalidated
        }
    }
}
