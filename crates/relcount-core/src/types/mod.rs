//! # Core Type Definitions
//!
//! This module contains the shared types of the relationship count cache:
//! - Graph identifiers (`VertexId`, `EdgeId`)
//! - Edge direction (`Direction`)
//! - Host edge representation (`EdgeRecord`, `Viewpoint`)
//! - Error types (`RelcountError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// GRAPH IDENTIFIERS
// =============================================================================

/// Identifier of a vertex in the host graph.
/// Every vertex owns an independent count cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u64);

/// Identifier of an edge in the host graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// DIRECTION
// =============================================================================

/// Direction of an edge as seen from one of its endpoints.
///
/// Cached entries are always `Outgoing` or `Incoming`. `Both` only appears in
/// queries, where it stands for the union of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    /// Canonical name used in descriptor strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Outgoing => "OUTGOING",
            Direction::Incoming => "INCOMING",
            Direction::Both => "BOTH",
        }
    }

    /// The direction seen from the other endpoint.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
            Direction::Both => Direction::Both,
        }
    }

    /// True for `Outgoing` and `Incoming`.
    #[must_use]
    pub const fn is_concrete(self) -> bool {
        !matches!(self, Direction::Both)
    }

    /// Does a query in direction `self` include entries cached in `cached`?
    #[must_use]
    pub fn includes(self, cached: Direction) -> bool {
        self == Direction::Both || self == cached
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = RelcountError;

    /// Accepts the canonical names as well as the short CLI forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OUTGOING" | "OUT" => Ok(Direction::Outgoing),
            "INCOMING" | "IN" => Ok(Direction::Incoming),
            "BOTH" => Ok(Direction::Both),
            _ => Err(RelcountError::InvalidDescriptor(format!(
                "unknown direction '{}'",
                s
            ))),
        }
    }
}

// =============================================================================
// HOST EDGE
// =============================================================================

/// An edge as the host graph reports it.
///
/// Properties keep the host's order; extraction policies decide which of them
/// become cache tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub label: String,
    pub start: VertexId,
    pub end: VertexId,
    pub properties: Vec<(String, String)>,
}

impl EdgeRecord {
    /// Create a new edge record.
    #[must_use]
    pub fn new(
        id: EdgeId,
        label: impl Into<String>,
        start: VertexId,
        end: VertexId,
        properties: Vec<(String, String)>,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            start,
            end,
            properties,
        }
    }

    /// True if both endpoints are the same vertex.
    #[must_use]
    pub fn is_loop(&self) -> bool {
        self.start == self.end
    }

    /// Get a property value by key.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Endpoints that need a cache update, each with the direction of the
    /// edge from its point of view.
    ///
    /// A self-loop is reported twice on the same vertex: once `Incoming` on
    /// behalf of its start and once `Outgoing` on behalf of its end.
    #[must_use]
    pub fn viewpoints(&self) -> [Viewpoint; 2] {
        if self.is_loop() {
            [
                Viewpoint::new(self.start, Direction::Incoming),
                Viewpoint::new(self.end, Direction::Outgoing),
            ]
        } else {
            [
                Viewpoint::new(self.start, Direction::Outgoing),
                Viewpoint::new(self.end, Direction::Incoming),
            ]
        }
    }
}

/// One endpoint of an edge and the direction the edge has from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Viewpoint {
    pub vertex: VertexId,
    pub direction: Direction,
}

impl Viewpoint {
    #[must_use]
    pub const fn new(vertex: VertexId, direction: Direction) -> Self {
        Self { vertex, direction }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the relationship count cache.
///
/// - No silent failures
/// - Use `Result<T, RelcountError>` for fallible operations
/// - The core should never panic; all errors must be recoverable
#[derive(Debug, Error)]
pub enum RelcountError {
    /// Compaction has folded away the granularity the query asks for.
    /// Callers are expected to fall back to a full scan.
    #[error(
        "Unable to count relationships matching {query}: compaction has taken away the required granularity"
    )]
    AmbiguousCount { query: String },

    /// A canonical descriptor string could not be decoded.
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A mutation event failed validation.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The requested edge was not found in the host graph.
    #[error("Edge not found: {0:?}")]
    EdgeNotFound(EdgeId),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl RelcountError {
    /// True for the expected "fall back to a scan" outcome.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, RelcountError::AmbiguousCount { .. })
    }
}

// =============================================================================
// TESTS
// =============================================================================
