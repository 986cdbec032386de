//! # Innate Primitives
//!
//! Hardcoded runtime constants for the relationship count cache.
//!
//! These are compiled into the binary and are immutable at runtime. Tunable
//! values (threshold, scope, persistence) live in `RelcountConfig`; the
//! constants below are their defaults and the hard input limits.

/// Separator between the components of a canonical descriptor string.
///
/// - Canonical form: `label#DIRECTION#key1#value1#key2#value2...`
pub const SEPARATOR: char = '#';

/// Escape character for separators and wildcards inside components.
pub const ESCAPE: char = '\\';

/// Rendering of a wildcarded tag value in the canonical string.
pub const WILDCARD: &str = "*";

/// Default number of entries per group that triggers compaction.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 20;

/// Default cap on materialized aggregate entries per label/direction.
pub const DEFAULT_AGGREGATE_LIMIT: usize = 256;

/// Maximum number of tags an edge may carry to be power-set materialized.
///
/// - 2^8 = 256 subsets per edge. Edges with more tags saturate their group.
pub const MAX_MATERIALIZED_TAGS: usize = 8;

/// Default prefix of the vertex properties that hold the cache.
pub const DEFAULT_PROPERTY_PREFIX: &str = "_RC_";

/// Marker after the prefix for materialized aggregate entries.
pub const AGGREGATE_MARKER: &str = "~";

/// Marker after the prefix for saturated aggregate groups.
pub const SATURATED_MARKER: &str = "!";

/// Property name after the prefix that records primary entry order.
pub const ORDER_MARKER: &str = "@";

/// Magic bytes for the single-property binary format header.
///
/// - Blob = Magic Bytes ("RCNT") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"RCNT";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for edge labels.
///
/// Labels longer than this will be rejected by the Ingestor.
pub const MAX_LABEL_LENGTH: usize = 256;

/// Maximum length for tag keys.
pub const MAX_TAG_KEY_LENGTH: usize = 256;

/// Maximum length for tag values.
///
/// Values longer than this (64KB) will be rejected by the Ingestor.
/// This prevents memory exhaustion from malformed input.
pub const MAX_TAG_VALUE_LENGTH: usize = 65536;

/// Maximum number of tags on a single event.
pub const MAX_TAGS: usize = 64;

/// Maximum serialized size of a single-property cache blob (16MB).
pub const MAX_BLOB_SIZE: usize = 16 * 1024 * 1024;
