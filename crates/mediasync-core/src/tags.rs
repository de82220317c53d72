//! Status tags stored on remote media records.
//!
//! Tags are the only persisted state of an asset. On the wire they are a
//! single comma-delimited string; here they are a set so order and
//! duplicates never matter.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Semantic markers this tool reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    ValidatedFilesize,
    ValidatedMd5,
    InvalidFilesize,
    InvalidMd5,
    OriginalMissing,
    Duplicate,
    Encoded,
    Imported,
    Delete,
    Ignored,
    OriginalDeleted,
}

impl Tag {
    pub const ALL: [Tag; 11] = [
        Tag::ValidatedFilesize,
        Tag::ValidatedMd5,
        Tag::InvalidFilesize,
        Tag::InvalidMd5,
        Tag::OriginalMissing,
        Tag::Duplicate,
        Tag::Encoded,
        Tag::Imported,
        Tag::Delete,
        Tag::Ignored,
        Tag::OriginalDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::ValidatedFilesize => "validated.filesize",
            Tag::ValidatedMd5 => "validated.md5",
            Tag::InvalidFilesize => "invalid.filesize",
            Tag::InvalidMd5 => "invalid.md5",
            Tag::OriginalMissing => "original_missing",
            Tag::Duplicate => "duplicate",
            Tag::Encoded => "encoded",
            Tag::Imported => "imported",
            Tag::Delete => "delete",
            Tag::Ignored => "ignored",
            Tag::OriginalDeleted => "original.deleted",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag(pub String);

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tag '{}'", self.0)
    }
}

impl std::error::Error for UnknownTag {}

impl FromStr for Tag {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

/// Set of raw tag strings carried by a record.
///
/// Tags written by other tools are kept verbatim so that writing the set
/// back never drops them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: BTreeSet<String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the wire format. Spaces are removed before splitting.
    pub fn parse(raw: &str) -> Self {
        let stripped: String = raw.chars().filter(|c| *c != ' ').collect();
        let tags = stripped
            .split(',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self { tags }
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.tags.contains(tag.as_str())
    }

    pub fn contains_any(&self, tags: &[Tag]) -> bool {
        tags.iter().any(|t| self.contains(*t))
    }

    pub fn insert(&mut self, tag: Tag) -> bool {
        self.tags.insert(tag.as_str().to_string())
    }

    pub fn remove(&mut self, tag: Tag) -> bool {
        self.tags.remove(tag.as_str())
    }

    /// Copy of this set with `tags` removed.
    pub fn without(&self, tags: &[Tag]) -> Self {
        let mut out = self.clone();
        for tag in tags {
            out.remove(*tag);
        }
        out
    }

    /// Copy of this set with `tags` added.
    pub fn with(&self, tags: &[Tag]) -> Self {
        let mut out = self.clone();
        for tag in tags {
            out.insert(*tag);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Wire format: sorted, comma-joined.
    pub fn to_wire(&self) -> String {
        self.tags.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl Serialize for TagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| TagSet::parse(&s)).unwrap_or_default())
    }
}

/// Join tag names for log output, e.g. "encoded & imported".
pub fn describe(tags: &[Tag]) -> String {
    match tags {
        [] => String::new(),
        [only] => only.to_string(),
        [rest @ .., last] => {
            let head: Vec<&str> = rest.iter().map(Tag::as_str).collect();
            format!("{} & {}", head.join(", "), last)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_spaces_and_collapses_duplicates() {
        let tags = TagSet::parse(" encoded, imported ,encoded,,");
        assert_eq!(tags.len(), 2);
        assert!(tags.contains(Tag::Encoded));
        assert!(tags.contains(Tag::Imported));
        assert_eq!(tags.to_wire(), "encoded,imported");
    }

    #[test]
    fn test_unknown_tags_survive_mutation() {
        let tags = TagSet::parse("featured,encoded");
        let updated = tags.without(&[Tag::Encoded]).with(&[Tag::Duplicate]);
        assert_eq!(updated.to_wire(), "duplicate,featured");
    }

    #[test]
    fn test_tag_names_round_trip_through_from_str() {
        for tag in Tag::ALL {
            assert_eq!(tag.as_str().parse::<Tag>(), Ok(tag));
        }
        assert!("validated".parse::<Tag>().is_err());
    }

    #[test]
    fn test_null_tags_deserialize_empty() {
        let tags: TagSet = serde_json::from_str("null").unwrap();
        assert!(tags.is_empty());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&[Tag::Encoded]), "encoded");
        assert_eq!(
            describe(&[Tag::Encoded, Tag::Imported, Tag::Delete]),
            "encoded, imported & delete"
        );
    }
}
