//! End-to-end exercise: push three deltas, store a delete predicate,
//! compact the base, and confirm the predicate's effect survives.

use colonnade::common::{ColumnSchema, Version, VersionHash};
use colonnade::compaction::{run_base_compaction, CompactionPolicy, CompactionSignals};
use colonnade::delete_handler::{delete_cond, store_cond, DeleteHandler};
use colonnade::field::{DataType, Field};
use colonnade::push::{process, PushRequest, PushType};
use colonnade::tablet::Tablet;
use std::collections::HashMap;
use std::sync::Arc;

fn tablet() -> Arc<Tablet> {
    let dir = tempfile::tempdir().unwrap();
    let schema = vec![ColumnSchema { id: 0, name: "id".into(), data_type: DataType::Int32, is_key: true }];
    Arc::new(Tablet::new(100, 1, dir.path().to_path_buf(), schema))
}

fn push(t: &Arc<Tablet>, start: i64, end: i64, hash: u64) {
    process(
        t,
        PushRequest {
            version: Version::new(start, end),
            version_hash: VersionHash(hash),
            push_type: PushType::Load,
            rows: vec![],
            compressed: false,
            declared_checksum: 0,
            schema_mapping: None,
        },
    )
    .unwrap();
}

#[test]
fn push_then_delete_then_compact() {
    let t = tablet();
    push(&t, 0, 0, 1);
    push(&t, 1, 1, 2);
    push(&t, 2, 2, 3);

    store_cond(&t, 2, &["id=7".to_string()]).unwrap();

    let handler = DeleteHandler::init(&t, 2).unwrap();
    let mut row = HashMap::new();
    row.insert(0u32, Some(Field::Int32(7)));
    assert!(handler.is_filter_data(1, &row));
    assert!(!handler.is_filter_data(3, &row));

    let signals = CompactionSignals { cumulative_delta_count: 10, ..Default::default() };
    let outcome = run_base_compaction(&t, true, &CompactionPolicy::default(), &signals).unwrap();
    assert_eq!(outcome.new_version, Version::new(0, 2));
    assert_eq!(outcome.superseded.len(), 3);

    delete_cond(&t, 2, false).unwrap();
    assert!(t.read_header().delete_predicates.is_empty());
}

#[test]
fn idempotent_push_replay_does_not_duplicate_version() {
    let t = tablet();
    push(&t, 0, 0, 42);
    push(&t, 0, 0, 42); // same hash: idempotent replay
    assert_eq!(t.indices().len(), 1);
}
