//! Metadata for one immutable unit of columnar data at a single version.
//!
//! An `OlapIndex` is produced by push or compaction, published into the
//! tablet header on `header.save`, and physically unlinked only once every
//! reader that acquired it under a header read lock has released it. It
//! records `dir` alongside `segments` so a reader can locate the segment
//! files it names on disk ([`crate::storage::segment_reader::read_index_rows`]).

use crate::common::{ColumnId, SegmentId};
use crate::field::Field;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Serialize, Deserialize)]
pub struct OlapIndex {
    pub dir: PathBuf,
    pub segments: Vec<SegmentId>,
    pub row_count: u64,
    pub checksum: u32,
    pub column_stats: HashMap<ColumnId, (Field, Field)>,
    #[serde(skip, default = "default_refcount")]
    refcount: AtomicI64,
}

fn default_refcount() -> AtomicI64 {
    AtomicI64::new(1)
}

impl OlapIndex {
    pub fn new(
        dir: PathBuf,
        segments: Vec<SegmentId>,
        row_count: u64,
        checksum: u32,
        column_stats: HashMap<ColumnId, (Field, Field)>,
    ) -> Self {
        Self { dir, segments, row_count, checksum, column_stats, refcount: AtomicI64::new(1) }
    }

    /// Taken by any reader that holds a handle to this index under a header
    /// read lock, so physical deletion can wait until every holder drops it.
    pub fn acquire(&self) {
        self.refcount.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns `true` when this was the last outstanding reference, meaning
    /// the segment files are now safe to unlink.
    pub fn release(&self) -> bool {
        self.refcount.fetch_sub(1, Ordering::SeqCst) == 1
    }

    pub fn refcount(&self) -> i64 {
        self.refcount.load(Ordering::SeqCst)
    }
}
