//! # Common Types
//!
//! Shared identifiers and the [`Version`]/[`VersionHash`] types that thread
//! through every other module: tablets, the version graph, push, and
//! compaction all key off these.
//!
//! ## Usage
//!
//! ```rust
//! use colonnade::common::{Version, VersionHash};
//!
//! let delta = Version::singleton(7);
//! assert!(delta.is_singleton());
//! let base = Version::new(0, 6);
//! assert!(base.is_compound());
//! ```

use crate::field::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifies one tablet (a schema-stable partition of one table).
pub type TabletId = u64;

/// Identifies the schema revision a tablet was created under.
pub type SchemaHash = u32;

/// Identifies a column within a tablet's schema by ordinal position.
pub type ColumnId = u32;

/// Identifies one on-disk segment within an [`crate::storage::olap_index::OlapIndex`].
pub type SegmentId = u32;

// ============================================================================
// Collection / size limits
// ============================================================================

/// Maximum number of columns a tablet schema may declare.
pub const MAX_COLUMNS_PER_TABLET: usize = 1024;

/// Default bound on one on-disk segment before the writer rolls to a new one.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 256 * 1024 * 1024;

/// Default number of rows held in one in-flight [`RowBlock`](crate::storage::segment_writer::RowBlock).
pub const DEFAULT_ROW_BLOCK_CAPACITY: usize = 1024;

// ============================================================================
// Schema
// ============================================================================

/// One column's schema entry: its declared type and whether it is part of
/// the tablet's key (sort/aggregation) prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub id: ColumnId,
    pub name: String,
    pub data_type: DataType,
    pub is_key: bool,
}

/// A tablet's ordered column list, keyed by ordinal [`ColumnId`].
pub type Schema = Vec<ColumnSchema>;

pub fn find_column<'a>(schema: &'a Schema, column_id: ColumnId) -> Option<&'a ColumnSchema> {
    schema.iter().find(|c| c.id == column_id)
}

// ============================================================================
// Version
// ============================================================================

/// An ordered pair `(start, end)` of logical-write ordinals.
///
/// A *singleton* version (`start == end`) is a delta produced by one push.
/// A *compound* version (`start < end`) is the result of compacting every
/// singleton in `[start, end]` into one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub start: i64,
    pub end: i64,
}

impl Version {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn singleton(at: i64) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_singleton(&self) -> bool {
        self.start == self.end
    }

    pub fn is_compound(&self) -> bool {
        self.start < self.end
    }

    /// Whether `self` and `other` cover any logical write in common.
    pub fn overlaps(&self, other: &Version) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Whether `self` immediately precedes `other` with no gap.
    pub fn contiguous_with(&self, other: &Version) -> bool {
        self.end + 1 == other.start
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}]", self.start, self.end)
    }
}

/// Opaque 64-bit identity for the *contents* of a version, used for
/// idempotent push detection and post-compaction validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct VersionHash(pub u64);

impl fmt::Display for VersionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_vs_compound() {
        assert!(Version::singleton(3).is_singleton());
        assert!(!Version::singleton(3).is_compound());
        assert!(Version::new(0, 5).is_compound());
    }

    #[test]
    fn overlap_and_contiguity() {
        let a = Version::new(0, 5);
        let b = Version::new(6, 6);
        let c = Version::new(4, 8);
        assert!(a.contiguous_with(&b));
        assert!(!a.contiguous_with(&c));
        assert!(a.overlaps(&c));
        assert!(!a.overlaps(&Version::new(7, 9)));
    }
}
