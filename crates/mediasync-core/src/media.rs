use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::status::MediaStatus;
use crate::tags::TagSet;

/// Custom field holding the uploader's filename.
pub const ORIGINAL_FILENAME: &str = "original_filename";

/// A media asset as returned by the remote listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Stable remote identifier
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: TagSet,
    #[serde(default, deserialize_with = "string_map")]
    pub custom: BTreeMap<String, String>,
    /// Size of the uploaded original in bytes
    #[serde(
        default,
        alias = "filesize",
        deserialize_with = "lenient_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<u64>,
    /// Digest of the uploaded original, hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// Every other field the service returns
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MediaRecord {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            tags: TagSet::new(),
            custom: BTreeMap::new(),
            size: None,
            md5: None,
            extra: Map::new(),
        }
    }

    pub fn status(&self) -> MediaStatus {
        MediaStatus::from_tags(&self.tags)
    }

    pub fn has_original_filename(&self) -> bool {
        self.custom.contains_key(ORIGINAL_FILENAME)
    }

    /// The stored original filename, or the trimmed title when none was recorded.
    pub fn original_filename(&self) -> String {
        match self.custom.get(ORIGINAL_FILENAME) {
            Some(name) => name.clone(),
            None => self.title.trim().to_string(),
        }
    }

    /// Upload timestamp, when the service reports one.
    pub fn date(&self) -> Option<i64> {
        match self.extra.get("date")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// The record as a JSON object, the shape exclusion filters match against.
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Custom fields come back as an object of scalars, or as an empty list
/// when a record has none.
fn string_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    if let Some(Value::Object(map)) = value {
        for (k, v) in map {
            match v {
                Value::String(s) => {
                    out.insert(k, s);
                }
                Value::Number(n) => {
                    out.insert(k, n.to_string());
                }
                Value::Bool(b) => {
                    out.insert(k, b.to_string());
                }
                _ => {}
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::Tag;

    #[test]
    fn test_deserialize_service_shape() {
        let json = r#"{
            "key": "Ab12Cd34",
            "title": "  Lecture 1.mp4 ",
            "tags": "imported, original_missing",
            "custom": [],
            "size": "1048576",
            "md5": "d41d8cd98f00b204e9800998ecf8427e",
            "status": "ready",
            "date": 1300000000
        }"#;
        let record: MediaRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.key, "Ab12Cd34");
        assert_eq!(record.size, Some(1_048_576));
        assert!(record.tags.contains(Tag::OriginalMissing));
        assert!(record.custom.is_empty());
        assert_eq!(record.original_filename(), "Lecture 1.mp4");
        assert_eq!(record.date(), Some(1_300_000_000));
        assert_eq!(record.extra.get("status"), Some(&Value::from("ready")));
    }

    #[test]
    fn test_filesize_alias_and_custom_object() {
        let json = r#"{"key": "k", "filesize": 42, "custom": {"original_filename": "a.mov", "n": 3}}"#;
        let record: MediaRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.size, Some(42));
        assert_eq!(record.original_filename(), "a.mov");
        assert_eq!(record.custom.get("n").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_to_fields_flattens_extra_and_wire_tags() {
        let mut record = MediaRecord::new("k", "t");
        record.tags.insert(Tag::Encoded);
        record.extra.insert("author".into(), Value::from("someone"));
        let fields = record.to_fields();
        assert_eq!(fields.get("tags"), Some(&Value::from("encoded")));
        assert_eq!(fields.get("author"), Some(&Value::from("someone")));
    }
}
