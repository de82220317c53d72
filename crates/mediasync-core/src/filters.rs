//! Search and exclusion filters for remote listings.
//!
//! The service only understands positive search terms, so exclusions are
//! applied locally after the listing is fetched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::media::MediaRecord;

/// Field name that matches every top-level scalar field.
pub const ALL_FIELDS: &str = "*";

/// Field path -> search term. Paths are a field name, `parent.child`, or `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(BTreeMap<String, String>);

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, term: impl Into<String>, field: impl Into<String>) {
        self.0.insert(field.into(), term.into());
    }

    /// Add a term matched against all fields.
    pub fn add_any(&mut self, term: impl Into<String>) {
        self.add(term, ALL_FIELDS);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge `other` over this set; `other` wins on shared fields.
    pub fn merged(&self, other: &FilterSet) -> FilterSet {
        let mut out = self.clone();
        for (field, term) in other.iter() {
            out.add(term, field);
        }
        out
    }

    /// Query parameters for the remote listing, `search:<field>=<term>`.
    pub fn to_query(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(field, term)| (format!("search:{field}"), term.clone()))
            .collect()
    }

    /// True when any exclusion term matches the record.
    pub fn excludes(&self, record: &MediaRecord) -> bool {
        if self.is_empty() {
            return false;
        }
        let fields = record.to_fields();
        self.iter()
            .any(|(field, term)| field_matches(&fields, field, term))
    }
}

fn field_matches(fields: &Map<String, Value>, field: &str, term: &str) -> bool {
    if field == ALL_FIELDS {
        return fields.values().any(|value| scalar_contains(value, term));
    }

    let field = canonical_field(field);
    // One level of nesting only; anything after the first dot is the child name.
    match field.split_once('.') {
        Some((parent, child)) => fields
            .get(parent)
            .and_then(|p| p.as_object())
            .and_then(|p| p.get(child))
            .is_some_and(|value| scalar_contains(value, term)),
        None => fields
            .get(field)
            .is_some_and(|value| scalar_contains(value, term)),
    }
}

/// Maps service wire names onto the names records serialize under.
fn canonical_field(field: &str) -> &str {
    match field {
        "filesize" => "size",
        other => other,
    }
}

/// Case-insensitive substring match against a scalar. Objects, arrays and
/// nulls never match.
fn scalar_contains(value: &Value, term: &str) -> bool {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return false,
    };
    text.to_lowercase().contains(&term.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagSet;

    fn record(key: &str, tags: &str) -> MediaRecord {
        let mut r = MediaRecord::new(key, format!("Title {key}"));
        r.tags = TagSet::parse(tags);
        r
    }

    #[test]
    fn test_wildcard_excludes_on_any_field() {
        let mut filters = FilterSet::new();
        filters.add_any("FOO");
        assert!(filters.excludes(&record("a", "foo,bar")));
        assert!(!filters.excludes(&record("b", "baz")));
    }

    #[test]
    fn test_nested_field() {
        let mut r = record("a", "");
        r.custom.insert("course".into(), "Intro to Rust".into());
        let mut filters = FilterSet::new();
        filters.add("rust", "custom.course");
        assert!(filters.excludes(&r));

        let mut other = FilterSet::new();
        other.add("rust", "custom.missing");
        assert!(!other.excludes(&r));
    }

    #[test]
    fn test_single_level_field_compares_named_value() {
        let mut filters = FilterSet::new();
        filters.add("title b", "title");
        assert!(filters.excludes(&record("b", "")));
        assert!(!filters.excludes(&record("a", "")));
    }

    #[test]
    fn test_wire_field_name_matches_record_field() {
        let mut r = record("a", "");
        r.size = Some(1234);
        let mut filters = FilterSet::new();
        filters.add("1234", "filesize");
        assert!(filters.excludes(&r));

        r.size = Some(99);
        assert!(!filters.excludes(&r));
    }

    #[test]
    fn test_wildcard_skips_nested_objects() {
        let mut r = record("a", "");
        r.custom.insert("note".into(), "secret".into());
        let mut filters = FilterSet::new();
        filters.add_any("secret");
        assert!(!filters.excludes(&r));
    }

    #[test]
    fn test_query_prefix_and_merge_precedence() {
        let mut base = FilterSet::new();
        base.add("one", "title");
        base.add("x", "*");
        let mut local = FilterSet::new();
        local.add("two", "title");
        let query = base.merged(&local).to_query();
        assert_eq!(query.get("search:title").map(String::as_str), Some("two"));
        assert_eq!(query.get("search:*").map(String::as_str), Some("x"));
    }
}
