//! # Persistence Format
//!
//! How one vertex's cache is laid out in host vertex properties.
//!
//! Two layouts, chosen by [`PersistenceFormat`]:
//! - `PerEntry`: one integer property per entry, key `prefix + canonical`.
//!   Aggregate counters live under `prefix + "~" + canonical`, saturated
//!   groups under `prefix + "!" + label#DIR`. Property keys sort by name,
//!   so insertion order is kept in one extra blob `prefix + "@"`, a
//!   postcard list of the entry descriptors.
//! - `SingleProperty`: one blob property `prefix` holding the 5-byte header
//!   ("RCNT" + version) followed by a postcard-serialized [`VertexSnapshot`].
//!
//! ## Corrupt data
//!
//! A per-entry property that does not decode is skipped with a warning; the
//! rest of the cache still loads. A blob is all or nothing: a bad header,
//! oversized payload or undecodable body is an error.

use crate::config::PersistenceFormat;
use crate::descriptor::Descriptor;
use crate::mutation::VertexCache;
use crate::primitives::{
    self, AGGREGATE_MARKER, ESCAPE, MAX_BLOB_SIZE, ORDER_MARKER, SATURATED_MARKER,
};
use crate::storage::PropertyValue;
use crate::{Direction, RelcountError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Header length in bytes.
const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header that precedes every snapshot blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), RelcountError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(RelcountError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(RelcountError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RelcountError> {
        let Some(head) = bytes.get(..HEADER_SIZE) else {
            return Err(RelcountError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&head[0..4]);
        Ok(Self {
            magic,
            version: head[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Serializable state of one vertex cache.
///
/// Descriptors are kept in canonical form so both layouts share one
/// decoder. Entries keep store insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexSnapshot {
    pub entries: Vec<(String, u64)>,
    pub aggregates: Vec<(String, u64)>,
    pub saturated: Vec<(String, Direction)>,
}

impl VertexSnapshot {
    /// Capture the state of `cache`.
    #[must_use]
    pub fn capture(cache: &VertexCache) -> Self {
        let entries = cache
            .store()
            .enumerate()
            .map(|(d, c)| (d.encode(), c))
            .collect();
        let (aggregates, saturated) = match cache.aggregates() {
            Some(index) => (
                index.entries().map(|(d, c)| (d.encode(), c)).collect(),
                index.saturated().cloned().collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        Self {
            entries,
            aggregates,
            saturated,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.aggregates.is_empty() && self.saturated.is_empty()
    }

    /// Load this snapshot into `cache`, replacing its contents.
    ///
    /// Entries that do not decode are skipped with a warning. Aggregate
    /// state is ignored when `cache` has no aggregate index. When it has
    /// one, a group with primary entries but no counters (written without
    /// the index, or its counters lost) is saturated so reads sum the
    /// primary store instead of reporting zero.
    pub fn restore_into(&self, cache: &mut VertexCache) {
        cache.clear();
        for (canonical, count) in &self.entries {
            if let Some(descriptor) = decode_logged(canonical) {
                cache.store.restore(descriptor, *count);
            }
        }
        let Some(index) = cache.aggregates.as_mut() else {
            return;
        };
        for (label, direction) in &self.saturated {
            index.restore_saturated(label, *direction);
        }
        for (canonical, count) in &self.aggregates {
            if let Some(descriptor) = decode_logged(canonical) {
                index.restore(descriptor, *count);
            }
        }
        let groups: BTreeSet<(String, Direction)> =
            cache.store.enumerate().map(|(d, _)| d.group()).collect();
        for (label, direction) in groups {
            if !index.tracks(&label, direction) {
                index.saturate((label, direction), "cached entries have no aggregate counters");
            }
        }
    }
}

fn decode_logged(canonical: &str) -> Option<Descriptor> {
    match Descriptor::decode(canonical) {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            tracing::warn!(canonical, error = %e, "skipping corrupt cached count");
            None
        }
    }
}

// =============================================================================
// BLOB FORMAT
// =============================================================================

/// Serialize a snapshot to bytes (header + payload).
pub fn snapshot_to_bytes(snapshot: &VertexSnapshot) -> Result<Vec<u8>, RelcountError> {
    let payload = postcard::to_stdvec(snapshot)
        .map_err(|e| RelcountError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&PersistenceHeader::new().to_bytes());
    result.extend_from_slice(&payload);

    if result.len() > MAX_BLOB_SIZE {
        return Err(RelcountError::SerializationError(format!(
            "Snapshot size {} bytes exceeds maximum allowed {} bytes",
            result.len(),
            MAX_BLOB_SIZE
        )));
    }
    Ok(result)
}

/// Deserialize a snapshot from bytes.
///
/// Size and header are validated before the payload is parsed.
pub fn snapshot_from_bytes(bytes: &[u8]) -> Result<VertexSnapshot, RelcountError> {
    if bytes.len() > MAX_BLOB_SIZE {
        return Err(RelcountError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_BLOB_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        RelcountError::DeserializationError(format!("Failed to deserialize snapshot: {}", e))
    })
}

// =============================================================================
// PROPERTY LAYOUT
// =============================================================================

/// Lay out `snapshot` as vertex properties, keyed by property name.
pub fn encode_properties(
    snapshot: &VertexSnapshot,
    format: PersistenceFormat,
    prefix: &str,
) -> Result<BTreeMap<String, PropertyValue>, RelcountError> {
    let mut properties = BTreeMap::new();
    if snapshot.is_empty() {
        return Ok(properties);
    }

    match format {
        PersistenceFormat::SingleProperty => {
            properties.insert(
                prefix.to_string(),
                PropertyValue::Bytes(snapshot_to_bytes(snapshot)?),
            );
        }
        PersistenceFormat::PerEntry => {
            for (canonical, count) in &snapshot.entries {
                properties.insert(entry_key(prefix, canonical), count_value(*count)?);
            }
            if !snapshot.entries.is_empty() {
                let order: Vec<&str> = snapshot.entries.iter().map(|(c, _)| c.as_str()).collect();
                let bytes = postcard::to_stdvec(&order)
                    .map_err(|e| RelcountError::SerializationError(e.to_string()))?;
                properties.insert(
                    format!("{}{}", prefix, ORDER_MARKER),
                    PropertyValue::Bytes(bytes),
                );
            }
            for (canonical, count) in &snapshot.aggregates {
                properties.insert(
                    format!("{}{}{}", prefix, AGGREGATE_MARKER, canonical),
                    count_value(*count)?,
                );
            }
            for (label, direction) in &snapshot.saturated {
                let group = Descriptor::new(label.clone(), *direction).encode();
                properties.insert(
                    format!("{}{}{}", prefix, SATURATED_MARKER, group),
                    PropertyValue::Count(1),
                );
            }
        }
    }
    Ok(properties)
}

/// Read a snapshot back from the vertex properties under `prefix`.
///
/// `properties` must be sorted by key, as [`PropertyStore`] returns them,
/// so a per-entry reload is deterministic.
///
/// [`PropertyStore`]: crate::storage::PropertyStore
pub fn decode_properties(
    properties: &[(String, PropertyValue)],
    format: PersistenceFormat,
    prefix: &str,
) -> Result<VertexSnapshot, RelcountError> {
    match format {
        PersistenceFormat::SingleProperty => {
            match properties.iter().find(|(key, _)| key == prefix) {
                None => Ok(VertexSnapshot::default()),
                Some((_, PropertyValue::Bytes(bytes))) => snapshot_from_bytes(bytes),
                Some((_, PropertyValue::Count(_))) => Err(RelcountError::DeserializationError(
                    format!("Property {} is not a snapshot blob", prefix),
                )),
            }
        }
        PersistenceFormat::PerEntry => {
            let mut snapshot = VertexSnapshot::default();
            let mut order: Vec<String> = Vec::new();
            for (key, value) in properties {
                let Some(rest) = key.strip_prefix(prefix) else {
                    continue;
                };
                if rest.is_empty() {
                    continue;
                }
                if rest == ORDER_MARKER {
                    order = decode_order(key, value);
                    continue;
                }
                let count = match value {
                    PropertyValue::Count(c) if *c > 0 => u64::try_from(*c).unwrap_or(0),
                    _ => {
                        tracing::warn!(key = %key, "skipping cached count with invalid value");
                        continue;
                    }
                };
                if let Some(group) = rest.strip_prefix(SATURATED_MARKER) {
                    if let Some(d) = decode_logged(group) {
                        snapshot.saturated.push(d.group());
                    }
                } else if let Some(canonical) = rest.strip_prefix(AGGREGATE_MARKER) {
                    snapshot.aggregates.push((canonical.to_string(), count));
                } else {
                    snapshot.entries.push((unescape_entry(rest).to_string(), count));
                }
            }
            snapshot.entries = in_insertion_order(snapshot.entries, &order);
            Ok(snapshot)
        }
    }
}

fn decode_order(key: &str, value: &PropertyValue) -> Vec<String> {
    let PropertyValue::Bytes(bytes) = value else {
        tracing::warn!(key = %key, "entry order is not a blob, falling back to key order");
        return Vec::new();
    };
    postcard::from_bytes(bytes).unwrap_or_else(|e| {
        tracing::warn!(key = %key, error = %e, "undecodable entry order, falling back to key order");
        Vec::new()
    })
}

/// Sequence `entries` by `order`. Entries the list does not name keep key
/// order after the listed ones.
fn in_insertion_order(entries: Vec<(String, u64)>, order: &[String]) -> Vec<(String, u64)> {
    let mut by_key: BTreeMap<String, u64> = entries.into_iter().collect();
    let mut sequenced = Vec::with_capacity(by_key.len());
    for canonical in order {
        if let Some(count) = by_key.remove(canonical) {
            sequenced.push((canonical.clone(), count));
        }
    }
    sequenced.extend(by_key);
    sequenced
}

/// Property key of a primary entry. A label starting with a marker is
/// escaped so it cannot be read back as an aggregate or saturation key.
fn entry_key(prefix: &str, canonical: &str) -> String {
    if canonical.starts_with(AGGREGATE_MARKER) || canonical.starts_with(SATURATED_MARKER) {
        format!("{}{}{}", prefix, ESCAPE, canonical)
    } else {
        format!("{}{}", prefix, canonical)
    }
}

fn unescape_entry(rest: &str) -> &str {
    match rest.strip_prefix(ESCAPE) {
        Some(tail) if tail.starts_with(AGGREGATE_MARKER) || tail.starts_with(SATURATED_MARKER) => {
            tail
        }
        _ => rest,
    }
}

fn count_value(count: u64) -> Result<PropertyValue, RelcountError> {
    i64::try_from(count)
        .map(PropertyValue::Count)
        .map_err(|_| RelcountError::SerializationError(format!("count {} too large", count)))
}

// =============================================================================
// TESTS
// =============================================================================
