//! A tablet: one `(tablet_id, schema_hash)` partition's schema, version
//! graph, delete predicates, and the two-level lock set guarding them.
//!
//! Grounded in the original's `OLAPTable`/`SmartOLAPTable` (schema-stable
//! handle addressed by other components through an `Arc`) and
//! `base_compaction.h`'s `_obtain_header_rdlock`/`_obtain_header_wrlock`/
//! `_try_base_compaction_lock` lock-ordering discipline.

use crate::common::{Schema, SchemaHash, TabletId, Version, VersionHash};
use crate::error::{Result, StorageError};
use crate::storage::OlapIndex;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// The in-memory, on-disk-mirrored tablet header: schema, version graph,
/// and delete predicate entries. Serialized wholesale on every mutation
/// that needs to survive a restart, standing in for the original's
/// protobuf `OLAPHeaderMessage`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TabletHeader {
    pub schema: Schema,
    /// `version -> segment file ids` persisted form; in-memory this is
    /// accompanied by the live `OlapIndex` map on [`Tablet`].
    pub versions: Vec<Version>,
    /// Content hash recorded for each committed version, used to detect
    /// idempotent push replays.
    pub version_hashes: BTreeMap<Version, VersionHash>,
    /// Delete predicate entries keyed by the singleton delta version they
    /// were recorded at, each a list of `col OP value` textual conditions.
    pub delete_predicates: BTreeMap<i64, Vec<String>>,
}

impl TabletHeader {
    pub fn new(schema: Schema) -> Self {
        Self { schema, versions: Vec::new(), version_hashes: BTreeMap::new(), delete_predicates: BTreeMap::new() }
    }
}

pub struct Tablet {
    pub tablet_id: TabletId,
    pub schema_hash: SchemaHash,
    pub data_dir: PathBuf,
    header: RwLock<TabletHeader>,
    indices: RwLock<BTreeMap<Version, Arc<OlapIndex>>>,
    compaction_lock: Mutex<()>,
}

impl Tablet {
    pub fn new(tablet_id: TabletId, schema_hash: SchemaHash, data_dir: PathBuf, schema: Schema) -> Self {
        Self {
            tablet_id,
            schema_hash,
            data_dir,
            header: RwLock::new(TabletHeader::new(schema)),
            indices: RwLock::new(BTreeMap::new()),
            compaction_lock: Mutex::new(()),
        }
    }

    pub fn header_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}_{}.hdr", self.tablet_id, self.schema_hash))
    }

    pub fn read_header(&self) -> RwLockReadGuard<'_, TabletHeader> {
        self.header.read()
    }

    pub fn write_header(&self) -> RwLockWriteGuard<'_, TabletHeader> {
        self.header.write()
    }

    pub fn indices(&self) -> RwLockReadGuard<'_, BTreeMap<Version, Arc<OlapIndex>>> {
        self.indices.read()
    }

    pub fn indices_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<Version, Arc<OlapIndex>>> {
        self.indices.write()
    }

    /// Non-blocking: returns `None` if a compaction is already running on
    /// this tablet, matching `_try_base_compaction_lock`'s try-lock semantics.
    pub fn try_lock_compaction(&self) -> Option<MutexGuard<'_, ()>> {
        self.compaction_lock.try_lock()
    }

    /// Persist the current in-memory header to disk. On failure the caller
    /// is expected to roll back whatever in-memory mutation it just made.
    pub fn save_header(&self) -> Result<()> {
        let header = self.header.read();
        let bytes = bincode::serde::encode_to_vec(&*header, bincode::config::standard())?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::write(self.header_path(), bytes).map_err(StorageError::Io)
    }

    pub fn load_header(&self) -> Result<()> {
        let bytes = std::fs::read(self.header_path()).map_err(StorageError::Io)?;
        let (header, _): (TabletHeader, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        *self.header.write() = header;
        Ok(())
    }

    pub fn base_version(&self) -> Option<Version> {
        self.indices.read().keys().find(|v| v.start == 0).copied()
    }

    pub fn latest_end(&self) -> i64 {
        self.indices.read().keys().map(|v| v.end).max().unwrap_or(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ColumnSchema;
    use crate::field::DataType;

    fn schema() -> Schema {
        vec![ColumnSchema { id: 0, name: "k1".into(), data_type: DataType::Int64, is_key: true }]
    }

    #[test]
    fn compaction_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let tablet = Tablet::new(1, 42, dir.path().to_path_buf(), schema());
        let guard = tablet.try_lock_compaction().unwrap();
        assert!(tablet.try_lock_compaction().is_none());
        drop(guard);
        assert!(tablet.try_lock_compaction().is_some());
    }

    #[test]
    fn header_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let tablet = Tablet::new(1, 42, dir.path().to_path_buf(), schema());
        tablet.write_header().delete_predicates.insert(5, vec!["k1=1".into()]);
        tablet.save_header().unwrap();
        tablet.write_header().delete_predicates.clear();
        tablet.load_header().unwrap();
        assert_eq!(tablet.read_header().delete_predicates.len(), 1);
    }
}
