//! # Canonical Export Module
//!
//! > **Verification:**
//! > - Runtime: caches live in host vertex properties, redb files are NOT
//! >   guaranteed bit-identical across runs.
//! > - `export_canonical()` serializes every vertex cache of a host into a
//! >   sorted, bit-exact `postcard` stream.
//! >   **This export is the Source of Truth for verification.**
//!
//! Two hosts whose caches hold the same entries produce the same bytes,
//! regardless of insertion order or persistence layout.

use crate::cache::CountCache;
use crate::descriptor::Descriptor;
use crate::formats::VertexSnapshot;
use crate::storage::{EdgeSource, PropertyStore};
use crate::{RelcountError, VertexId};
use serde::{Deserialize, Serialize};

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Magic bytes for canonical export format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"RCEX";

/// Current canonical format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Maximum allowed vertex count in canonical imports.
pub const MAX_IMPORT_VERTEX_COUNT: u64 = 1_000_000;

/// Maximum allowed entry count (primary plus aggregate) in canonical imports.
pub const MAX_IMPORT_ENTRY_COUNT: u64 = 10_000_000;

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Number of vertices in the export.
    pub vertex_count: u64,

    /// Number of primary and aggregate entries in the export.
    pub entry_count: u64,

    /// Checksum of the data section.
    pub checksum: u64,
}

impl CanonicalHeader {
    /// Create a new header with the given counts.
    #[must_use]
    pub fn new(vertex_count: u64, entry_count: u64, checksum: u64) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            vertex_count,
            entry_count,
            checksum,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), RelcountError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(RelcountError::DeserializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != CANONICAL_VERSION {
            return Err(RelcountError::DeserializationError(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CANONICAL VERTEX
// =============================================================================

/// One cached count in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanonicalEntry {
    /// Canonical descriptor string (sort key).
    pub descriptor: String,
    pub count: u64,
}

/// The cache of one vertex, every list sorted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalVertex {
    pub vertex: u64,
    pub entries: Vec<CanonicalEntry>,
    pub aggregates: Vec<CanonicalEntry>,
    /// Saturated groups as `label#DIRECTION`.
    pub saturated: Vec<String>,
}

impl CanonicalVertex {
    fn from_snapshot(vertex: VertexId, snapshot: VertexSnapshot) -> Self {
        let sorted = |rows: Vec<(String, u64)>| {
            let mut rows: Vec<CanonicalEntry> = rows
                .into_iter()
                .map(|(descriptor, count)| CanonicalEntry { descriptor, count })
                .collect();
            rows.sort();
            rows
        };
        let mut saturated: Vec<String> = snapshot
            .saturated
            .iter()
            .map(|(label, direction)| Descriptor::new(label.clone(), *direction).encode())
            .collect();
        saturated.sort();
        Self {
            vertex: vertex.0,
            entries: sorted(snapshot.entries),
            aggregates: sorted(snapshot.aggregates),
            saturated,
        }
    }

    /// Convert back to a snapshot. Fails on a corrupt saturated group.
    pub fn to_snapshot(&self) -> Result<VertexSnapshot, RelcountError> {
        let rows = |entries: &[CanonicalEntry]| {
            entries
                .iter()
                .map(|e| (e.descriptor.clone(), e.count))
                .collect()
        };
        let saturated = self
            .saturated
            .iter()
            .map(|group| Descriptor::decode(group).map(|d| d.group()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(VertexSnapshot {
            entries: rows(&self.entries),
            aggregates: rows(&self.aggregates),
            saturated,
        })
    }
}

/// Every vertex cache of a host in canonical format.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalExport {
    /// Vertices sorted by id; vertices with an empty cache are omitted.
    pub vertices: Vec<CanonicalVertex>,
}

impl CanonicalExport {
    /// Collect the caches of every vertex of `host`.
    pub fn from_host<H: PropertyStore + EdgeSource + ?Sized>(
        cache: &CountCache,
        host: &H,
    ) -> Result<Self, RelcountError> {
        let mut vertices = Vec::new();
        for vertex in host.vertices()? {
            let snapshot = VertexSnapshot::capture(&cache.load(host, vertex)?);
            if !snapshot.is_empty() {
                vertices.push(CanonicalVertex::from_snapshot(vertex, snapshot));
            }
        }
        vertices.sort_by_key(|v| v.vertex);
        Ok(Self { vertices })
    }

    /// Number of primary and aggregate entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.vertices
            .iter()
            .map(|v| (v.entries.len() + v.aggregates.len()) as u64)
            .sum()
    }

    /// Compute a deterministic checksum of the data.
    ///
    /// Rotate-and-XOR over every field. Detects accidental corruption; it
    /// is NOT a cryptographic hash (see `canonical_crypto_hash`).
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hash: u64 = 0;
        let mut mix = |value: u64| {
            hash = hash.rotate_left(7) ^ value;
        };
        for vertex in &self.vertices {
            mix(vertex.vertex);
            for (marker, rows) in [(1u64, &vertex.entries), (2u64, &vertex.aggregates)] {
                mix(marker);
                for entry in rows {
                    for byte in entry.descriptor.as_bytes() {
                        mix(u64::from(*byte));
                    }
                    mix(entry.count);
                }
            }
            mix(3);
            for group in &vertex.saturated {
                for byte in group.as_bytes() {
                    mix(u64::from(*byte));
                }
            }
        }
        hash
    }
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Export every vertex cache of `host` to canonical postcard format.
///
/// Format:
/// ```text
/// [header_len: u32 LE] [CanonicalHeader (postcard)] [CanonicalExport (postcard)]
/// ```
pub fn export_canonical<H: PropertyStore + EdgeSource + ?Sized>(
    cache: &CountCache,
    host: &H,
) -> Result<Vec<u8>, RelcountError> {
    encode_canonical(&CanonicalExport::from_host(cache, host)?)
}

/// Serialize an already collected export.
pub fn encode_canonical(canonical: &CanonicalExport) -> Result<Vec<u8>, RelcountError> {
    let header = CanonicalHeader::new(
        canonical.vertices.len() as u64,
        canonical.entry_count(),
        canonical.checksum(),
    );

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| RelcountError::SerializationError(format!("Header: {}", e)))?;
    let data_bytes = postcard::to_allocvec(canonical)
        .map_err(|e| RelcountError::SerializationError(format!("Data: {}", e)))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| RelcountError::SerializationError("Header too large".to_string()))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&header_len.to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Import a canonical export, validating header, limits and checksum.
pub fn import_canonical(data: &[u8]) -> Result<CanonicalExport, RelcountError> {
    let Some(len_bytes) = data.get(..4) else {
        return Err(RelcountError::DeserializationError(
            "Data too short".to_string(),
        ));
    };
    let header_len =
        u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    let Some(header_bytes) = data.get(4..4usize.saturating_add(header_len)) else {
        return Err(RelcountError::DeserializationError(
            "Data too short for header".to_string(),
        ));
    };

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| RelcountError::DeserializationError(format!("Header: {}", e)))?;
    header.validate()?;

    // Validate size limits BEFORE deserializing the body
    if header.vertex_count > MAX_IMPORT_VERTEX_COUNT {
        return Err(RelcountError::DeserializationError(format!(
            "Vertex count {} exceeds maximum allowed {}",
            header.vertex_count, MAX_IMPORT_VERTEX_COUNT
        )));
    }
    if header.entry_count > MAX_IMPORT_ENTRY_COUNT {
        return Err(RelcountError::DeserializationError(format!(
            "Entry count {} exceeds maximum allowed {}",
            header.entry_count, MAX_IMPORT_ENTRY_COUNT
        )));
    }

    let canonical: CanonicalExport = postcard::from_bytes(&data[4 + header_len..])
        .map_err(|e| RelcountError::DeserializationError(format!("Data: {}", e)))?;

    let computed = canonical.checksum();
    if computed != header.checksum {
        return Err(RelcountError::DeserializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }
    if canonical.vertices.len() as u64 != header.vertex_count {
        return Err(RelcountError::DeserializationError(
            "Vertex count mismatch".to_string(),
        ));
    }
    if canonical.entry_count() != header.entry_count {
        return Err(RelcountError::DeserializationError(
            "Entry count mismatch".to_string(),
        ));
    }

    Ok(canonical)
}

/// Write every vertex cache of an import back to `host`.
///
/// Only the vertices present in the export are touched.
pub fn restore_canonical<H: PropertyStore + ?Sized>(
    cache: &CountCache,
    host: &mut H,
    canonical: &CanonicalExport,
) -> Result<(), RelcountError> {
    for vertex in &canonical.vertices {
        cache.write_snapshot(host, VertexId(vertex.vertex), &vertex.to_snapshot()?)?;
    }
    Ok(())
}

/// Verify that the caches of `host` match a canonical export.
pub fn verify_canonical<H: PropertyStore + EdgeSource + ?Sized>(
    cache: &CountCache,
    host: &H,
    canonical_data: &[u8],
) -> Result<bool, RelcountError> {
    let imported = import_canonical(canonical_data)?;
    Ok(CanonicalExport::from_host(cache, host)? == imported)
}

/// Compute the canonical checksum of the caches of `host`.
pub fn canonical_checksum<H: PropertyStore + EdgeSource + ?Sized>(
    cache: &CountCache,
    host: &H,
) -> Result<u64, RelcountError> {
    Ok(CanonicalExport::from_host(cache, host)?.checksum())
}

// =============================================================================
// CRYPTOGRAPHIC HASH SUPPORT
// =============================================================================

/// Compute a BLAKE3 hash of the canonical export, as a hex string.
///
/// # Requires
///
/// This function is only available with the `crypto-hash` feature enabled.
#[cfg(feature = "crypto-hash")]
pub fn canonical_crypto_hash<H: PropertyStore + EdgeSource + ?Sized>(
    cache: &CountCache,
    host: &H,
) -> Result<String, RelcountError> {
    let data = export_canonical(cache, host)?;
    Ok(compute_blake3_hash(&data))
}

/// Compute a BLAKE3 hash of raw bytes.
///
/// # Requires
///
/// This function is only available with the `crypto-hash` feature enabled.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================
