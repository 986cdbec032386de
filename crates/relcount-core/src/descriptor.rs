//! # Relationship Descriptor
//!
//! A descriptor names a class of edges touching one vertex: a label, a
//! direction and an ordered list of key/value tags, where a tag value is
//! either a concrete literal or the wildcard `Any`.
//!
//! ## Canonical String
//!
//! ```text
//! label#DIRECTION#key1#value1#key2#value2...
//! ```
//!
//! Tags appear in insertion order. A wildcard value is rendered `*`.
//! Inside every component `\` and `#` are escaped with a backslash, and a
//! literal value that is exactly `*` is rendered `\*`, so distinct
//! descriptors never share a canonical string.

use crate::primitives::{ESCAPE, SEPARATOR, WILDCARD};
use crate::{Direction, RelcountError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// TAG VALUE
// =============================================================================

/// Value of a single tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TagValue {
    /// A concrete value.
    Literal(String),
    /// Wildcard: any value, including absence of the key.
    Any,
}

impl TagValue {
    /// True for `TagValue::Any`.
    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, TagValue::Any)
    }

    /// The concrete value, if any.
    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            TagValue::Literal(v) => Some(v),
            TagValue::Any => None,
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Literal(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Literal(value)
    }
}

// =============================================================================
// DESCRIPTOR
// =============================================================================

/// Label + direction + ordered tags.
///
/// Equality and hashing follow the canonical string, so two descriptors with
/// the same tags in a different order are distinct values. Semantic relations
/// (see `lattice`) ignore tag order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    label: String,
    direction: Direction,
    tags: Vec<(String, TagValue)>,
}

impl Descriptor {
    /// Create a descriptor without tags.
    #[must_use]
    pub fn new(label: impl Into<String>, direction: Direction) -> Self {
        Self {
            label: label.into(),
            direction,
            tags: Vec::new(),
        }
    }

    /// Create a literal descriptor from concrete key/value pairs.
    ///
    /// A repeated key keeps its first position and its last value.
    pub fn literal<K, V>(
        label: impl Into<String>,
        direction: Direction,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        tags.into_iter()
            .fold(Self::new(label, direction), |desc, (k, v)| {
                desc.with(k, TagValue::Literal(v.into()))
            })
    }

    /// Set a tag, replacing the value of an existing key in place.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.set(key.into(), value.into());
        self
    }

    /// Set a tag to the wildcard.
    #[must_use]
    pub fn with_any(self, key: impl Into<String>) -> Self {
        self.with(key, TagValue::Any)
    }

    /// Same label and tags, another direction.
    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    fn set(&mut self, key: String, value: TagValue) {
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.tags.push((key, value)),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn tags(&self) -> &[(String, TagValue)] {
        &self.tags
    }

    /// Value of the tag under `key`, `None` if the key is absent.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|(k, _)| k.as_str())
    }

    /// True if every tag is concrete.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.tags.iter().all(|(_, v)| !v.is_any())
    }

    /// True if at least one tag is a wildcard.
    #[must_use]
    pub fn is_general(&self) -> bool {
        !self.is_literal()
    }

    /// Replace the value at `key` with `Any`.
    ///
    /// A key the descriptor does not have is appended as `Any`.
    #[must_use]
    pub fn generalize_one_tag(&self, key: &str) -> Self {
        self.clone().with_any(key)
    }

    /// Wildcard every key in `keys`.
    #[must_use]
    pub fn generalize_tags<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        keys.into_iter()
            .fold(self.clone(), |desc, key| desc.with_any(key))
    }

    /// The same descriptor with tags sorted by key.
    ///
    /// Used where identity must not depend on extraction order.
    #[must_use]
    pub fn sorted(&self) -> Self {
        let mut tags = self.tags.clone();
        tags.sort();
        Self {
            label: self.label.clone(),
            direction: self.direction,
            tags,
        }
    }

    /// Key identifying the compaction group of this descriptor.
    #[must_use]
    pub fn group(&self) -> (String, Direction) {
        (self.label.clone(), self.direction)
    }

    // =========================================================================
    // CANONICAL CODEC
    // =========================================================================

    /// Encode to the canonical string.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.label.len() + 16 + self.tags.len() * 16);
        escape_into(&mut out, &self.label);
        out.push(SEPARATOR);
        out.push_str(self.direction.as_str());
        for (key, value) in &self.tags {
            out.push(SEPARATOR);
            escape_into(&mut out, key);
            out.push(SEPARATOR);
            match value {
                TagValue::Any => out.push_str(WILDCARD),
                TagValue::Literal(v) if v == WILDCARD => {
                    out.push(ESCAPE);
                    out.push_str(WILDCARD);
                }
                TagValue::Literal(v) => escape_into(&mut out, v),
            }
        }
        out
    }

    /// Decode a canonical string.
    ///
    /// Fails with `InvalidDescriptor` on an empty label, an unknown direction,
    /// a dangling key, a repeated key or a malformed escape.
    pub fn decode(s: &str) -> Result<Self, RelcountError> {
        let segments = split_segments(s)?;
        let mut iter = segments.into_iter();

        let label = match iter.next() {
            Some(seg) if !seg.text.is_empty() => seg.text,
            _ => return Err(invalid(s, "empty label")),
        };
        let direction = match iter.next() {
            Some(seg) if !seg.escaped => [Direction::Outgoing, Direction::Incoming, Direction::Both]
                .into_iter()
                .find(|d| d.as_str() == seg.text)
                .ok_or_else(|| invalid(s, "unknown direction"))?,
            _ => return Err(invalid(s, "missing direction")),
        };

        let mut desc = Self::new(label, direction);
        while let Some(key) = iter.next() {
            let Some(value) = iter.next() else {
                return Err(invalid(s, "key without value"));
            };
            if desc.tag(&key.text).is_some() {
                return Err(invalid(s, "repeated key"));
            }
            let value = if !value.escaped && value.text == WILDCARD {
                TagValue::Any
            } else {
                TagValue::Literal(value.text)
            };
            desc.tags.push((key.text, value));
        }
        Ok(desc)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Descriptor {
    type Err = RelcountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

// =============================================================================
// ESCAPING
// =============================================================================

fn escape_into(out: &mut String, component: &str) {
    for c in component.chars() {
        if c == ESCAPE || c == SEPARATOR {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

struct Segment {
    text: String,
    /// At least one escape sequence appeared in this segment.
    escaped: bool,
}

fn split_segments(s: &str) -> Result<Vec<Segment>, RelcountError> {
    let mut segments = Vec::new();
    let mut current = Segment {
        text: String::new(),
        escaped: false,
    };
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            match chars.next() {
                Some(next) if next == ESCAPE || next == SEPARATOR || next == '*' => {
                    current.text.push(next);
                    current.escaped = true;
                }
                Some(_) => return Err(invalid(s, "unknown escape")),
                None => return Err(invalid(s, "dangling escape")),
            }
        } else if c == SEPARATOR {
            segments.push(std::mem::replace(
                &mut current,
                Segment {
                    text: String::new(),
                    escaped: false,
                },
            ));
        } else {
            current.text.push(c);
        }
    }
    segments.push(current);
    Ok(segments)
}

fn invalid(s: &str, reason: &str) -> RelcountError {
    RelcountError::InvalidDescriptor(format!("{}: '{}'", reason, s))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_plain_descriptor() {
        let desc = Descriptor::literal("test", Direction::Outgoing, [("k1", "v1"), ("k2", "v2")]);
        assert_eq!(desc.encode(), "test#OUTGOING#k1#v1#k2#v2");
        assert!(desc.is_literal());
    }

    #[test]
    fn encode_wildcard_and_escapes() {
        let desc = Descriptor::new("a#b", Direction::Incoming)
            .with("k\\", "*")
            .with_any("k2");
        assert_eq!(desc.encode(), "a\\#b#INCOMING#k\\\\#\\*#k2#*");
        assert!(desc.is_general());
    }

    #[test]
    fn decode_inverts_encode_on_awkward_components() {
        let desc = Descriptor::new("FRIEND_OF", Direction::Both)
            .with("weird#key", "value\\with#both")
            .with("star", "*")
            .with_any("wild")
            .with("empty", "");
        let decoded = Descriptor::decode(&desc.encode()).expect("decode");
        assert_eq!(decoded, desc);
    }

    #[test]
    fn decode_rejects_malformed_strings() {
        for bad in [
            "",
            "label",
            "label#SIDEWAYS",
            "label#OUT",
            "#OUTGOING",
            "label#OUTGOING#k1",
            "label#OUTGOING#k1#v1#k1#v2",
            "label#OUTGOING#k1#v\\x",
            "label#OUTGOING#k1#v\\",
        ] {
            assert!(Descriptor::decode(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn with_replaces_existing_key_in_place() {
        let desc = Descriptor::literal("t", Direction::Outgoing, [("a", "1"), ("b", "2")]).with("a", "3");
        assert_eq!(desc.encode(), "t#OUTGOING#a#3#b#2");
    }

    #[test]
    fn generalize_one_tag_replaces_or_appends() {
        let desc = Descriptor::literal("t", Direction::Outgoing, [("k1", "v1")]);
        assert_eq!(desc.generalize_one_tag("k1").encode(), "t#OUTGOING#k1#*");
        assert_eq!(
            desc.generalize_one_tag("k2").encode(),
            "t#OUTGOING#k1#v1#k2#*"
        );
        // Source descriptor is untouched.
        assert!(desc.is_literal());
    }

    #[test]
    fn tag_order_is_part_of_identity() {
        let ab = Descriptor::literal("t", Direction::Outgoing, [("a", "1"), ("b", "2")]);
        let ba = Descriptor::literal("t", Direction::Outgoing, [("b", "2"), ("a", "1")]);
        assert_ne!(ab, ba);
        assert_eq!(ab.sorted(), ba.sorted());
    }

    #[test]
    fn zero_tag_and_wildcarded_are_distinct_encodings() {
        let bare = Descriptor::new("t", Direction::Outgoing);
        let wild = Descriptor::new("t", Direction::Outgoing).with_any("k1");
        assert_ne!(bare.encode(), wild.encode());
        assert!(bare.is_literal());
    }
}
