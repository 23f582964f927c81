//! Delete-condition store: persists predicates in the tablet header keyed
//! by the end version of the delta they apply from, and a scan-time
//! `DeleteHandler` that loads and applies them.

use crate::common::ColumnId;
use crate::condition::Conditions;
use crate::error::{Result, StorageError};
use crate::field::Field;
use crate::tablet::Tablet;
use std::collections::HashMap;
use std::sync::Arc;

/// `version < 0` or an empty condition list is rejected outright; every
/// condition is validated against the schema before anything is persisted.
pub fn store_cond(tablet: &Arc<Tablet>, version: i64, conds: &[String]) -> Result<()> {
    if version < 0 {
        return Err(StorageError::InvalidParameters("version must be non-negative".into()));
    }
    if conds.is_empty() {
        return Err(StorageError::InvalidParameters("conds must not be empty".into()));
    }

    // Validate without mutating anything yet: a single bad condition must
    // leave the header untouched.
    {
        let header = tablet.read_header();
        let mut validation = Conditions::new(Arc::clone(tablet));
        for text in conds {
            validation.append_condition(&header.schema, text)?;
        }
    }

    let mut header = tablet.write_header();
    let previous = header.delete_predicates.insert(version, conds.to_vec());
    drop(header);

    if let Err(e) = tablet.save_header() {
        // roll back the in-memory replace
        let mut header = tablet.write_header();
        match previous {
            Some(prev) => {
                header.delete_predicates.insert(version, prev);
            }
            None => {
                header.delete_predicates.remove(&version);
            }
        }
        return Err(e);
    }
    Ok(())
}

/// `prefix == false` removes the single entry at `version`; `prefix ==
/// true` removes every entry with `entry.version <= version`.
pub fn delete_cond(tablet: &Arc<Tablet>, version: i64, prefix: bool) -> Result<()> {
    let mut header = tablet.write_header();
    let removed: Vec<(i64, Vec<String>)> = if prefix {
        let keys: Vec<i64> = header.delete_predicates.range(..=version).map(|(k, _)| *k).collect();
        keys.into_iter()
            .map(|k| (k, header.delete_predicates.remove(&k).unwrap()))
            .collect()
    } else {
        match header.delete_predicates.remove(&version) {
            Some(v) => vec![(version, v)],
            None => Vec::new(),
        }
    };
    drop(header);

    if removed.is_empty() {
        return Ok(());
    }
    if let Err(e) = tablet.save_header() {
        let mut header = tablet.write_header();
        for (k, v) in removed {
            header.delete_predicates.insert(k, v);
        }
        return Err(e);
    }
    Ok(())
}

/// Loaded, parsed delete predicates applicable at a given scan version.
pub struct DeleteHandler {
    entries: Vec<(i64, Conditions<Tablet>)>,
}

impl DeleteHandler {
    /// Load every entry with `entry.version <= scan_version` and parse it.
    pub fn init(tablet: &Arc<Tablet>, scan_version: i64) -> Result<Self> {
        let header = tablet.read_header();
        let mut entries = Vec::new();
        for (&version, conds) in header.delete_predicates.range(..=scan_version) {
            let mut parsed = Conditions::new(Arc::clone(tablet));
            for text in conds {
                parsed.append_condition(&header.schema, text)?;
            }
            entries.push((version, parsed));
        }
        Ok(Self { entries })
    }

    /// A row from a delta ending at `row_version` is filtered iff some
    /// loaded entry recorded **at or after** that delta fully accepts it.
    pub fn is_filter_data(&self, row_version: i64, row: &HashMap<ColumnId, Option<Field>>) -> bool {
        self.entries
            .iter()
            .any(|(entry_version, conds)| *entry_version >= row_version && conds.eval(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ColumnSchema;
    use crate::field::DataType;

    fn tablet() -> Arc<Tablet> {
        let dir = tempfile::tempdir().unwrap();
        let schema = vec![ColumnSchema { id: 0, name: "k1".into(), data_type: DataType::Int32, is_key: true }];
        Arc::new(Tablet::new(1, 1, dir.path().to_path_buf(), schema))
    }

    #[test]
    fn rejects_negative_version_and_empty_conds() {
        let t = tablet();
        assert!(matches!(
            store_cond(&t, -1, &["k1=1".to_string()]),
            Err(StorageError::InvalidParameters(_))
        ));
        assert!(matches!(store_cond(&t, 1, &[]), Err(StorageError::InvalidParameters(_))));
    }

    #[test]
    fn store_replaces_existing_entry_atomically() {
        let t = tablet();
        store_cond(&t, 5, &["k1=1".to_string()]).unwrap();
        store_cond(&t, 5, &["k1=2".to_string()]).unwrap();
        assert_eq!(t.read_header().delete_predicates[&5], vec!["k1=2".to_string()]);
    }

    #[test]
    fn prefix_delete_removes_all_at_or_below() {
        let t = tablet();
        store_cond(&t, 1, &["k1=1".to_string()]).unwrap();
        store_cond(&t, 3, &["k1=2".to_string()]).unwrap();
        store_cond(&t, 5, &["k1=3".to_string()]).unwrap();
        delete_cond(&t, 3, true).unwrap();
        let remaining: Vec<i64> = t.read_header().delete_predicates.keys().copied().collect();
        assert_eq!(remaining, vec![5]);
    }

    #[test]
    fn is_filter_data_applies_at_or_after_row_version_only() {
        let t = tablet();
        store_cond(&t, 5, &["k1=7".to_string()]).unwrap();
        let handler = DeleteHandler::init(&t, 10).unwrap();
        let mut row = HashMap::new();
        row.insert(0, Some(Field::Int32(7)));

        assert!(handler.is_filter_data(3, &row)); // delta at version 3, predicate at 5 >= 3
        assert!(!handler.is_filter_data(6, &row)); // delta at version 6, predicate at 5 < 6
    }
}
