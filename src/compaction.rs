//! Base and cumulative compaction: merge a tablet's base and cumulative
//! deltas into fewer, larger indices while applying delete predicates.
//!
//! Grounded in `base_compaction.h`'s `BaseCompaction` class and lock
//! discipline (`_try_base_compaction_lock`, `_obtain_header_rdlock`,
//! `_obtain_header_wrlock`). `CumulativeCompaction` is the supplemental
//! sibling named in `SPEC_FULL.md` §4.G, sharing the same merge-read and
//! atomic-header-update machinery over a narrower version range.

use crate::common::{Version, VersionHash};
use crate::delete_handler::DeleteHandler;
use crate::error::{Result, StorageError};
use crate::storage::segment_writer::SegmentWriter;
use crate::storage::OlapIndex;
use crate::tablet::Tablet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct CompactionPolicy {
    pub min_cumulative_bytes: u64,
    pub min_cumulative_deltas: usize,
    pub min_seconds_since_last_base: u64,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self { min_cumulative_bytes: 512 * 1024 * 1024, min_cumulative_deltas: 5, min_seconds_since_last_base: 3600 }
    }
}

/// Observed state fed into the policy check; callers gather this from
/// whatever metrics/clock source they use, since neither a clock nor a
/// size accountant is part of this module's contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactionSignals {
    pub cumulative_bytes_since_base: u64,
    pub cumulative_delta_count: usize,
    pub seconds_since_last_base: u64,
}

fn policy_satisfied(policy: &CompactionPolicy, signals: &CompactionSignals) -> bool {
    signals.cumulative_bytes_since_base >= policy.min_cumulative_bytes
        || signals.cumulative_delta_count >= policy.min_cumulative_deltas
        || signals.seconds_since_last_base >= policy.min_seconds_since_last_base
}

/// Result of a successful merge: the new version, its index, and every
/// superseded version whose files are now safe to collect once their
/// readers drain.
pub struct CompactionOutcome {
    pub new_version: Version,
    pub new_version_hash: VersionHash,
    pub superseded: Vec<Version>,
}

/// Run base compaction against `tablet`. `is_manual` bypasses the policy
/// gate (an operator-triggered compaction always runs once the lock and
/// contiguity checks pass).
pub fn run_base_compaction(
    tablet: &Arc<Tablet>,
    is_manual: bool,
    policy: &CompactionPolicy,
    signals: &CompactionSignals,
) -> Result<CompactionOutcome> {
    let _guard = tablet.try_lock_compaction().ok_or(StorageError::Busy)?;

    if !is_manual && !policy_satisfied(policy, signals) {
        return Err(StorageError::NoSuitableVersion);
    }

    let (old_base, candidates) = {
        let indices = tablet.indices();
        let old_base = indices.keys().find(|v| v.start == 0).copied();
        let latest_end = indices.keys().map(|v| v.end).max();
        match (old_base, latest_end) {
            (Some(base), Some(end)) if end > base.end => {
                let candidates: Vec<Version> =
                    indices.keys().filter(|v| v.start > base.end && v.end <= end).copied().collect();
                (base, candidates)
            }
            _ => return Err(StorageError::NoSuitableVersion),
        }
    };

    let (candidates, stopped_at) = exclude_not_expired_delete(tablet, candidates)?;
    if candidates.is_empty() {
        return Err(StorageError::NoSuitableVersion);
    }

    let new_end = match stopped_at {
        Some(limit) => candidates.iter().map(|v| v.end).filter(|e| *e <= limit).max(),
        None => candidates.iter().map(|v| v.end).max(),
    }
    .ok_or(StorageError::NoSuitableVersion)?;

    let merged_versions: Vec<Version> = std::iter::once(old_base)
        .chain(candidates.into_iter().filter(|v| v.end <= new_end))
        .collect();
    validate_need_merged_versions(&merged_versions, old_base.start, new_end)?;

    do_merge_and_publish(tablet, &merged_versions, Version::new(0, new_end))
}

/// Merge every cumulative version above the base into one new cumulative
/// compound, leaving the base untouched.
pub fn run_cumulative_compaction(
    tablet: &Arc<Tablet>,
    policy: &CompactionPolicy,
    signals: &CompactionSignals,
) -> Result<CompactionOutcome> {
    let _guard = tablet.try_lock_compaction().ok_or(StorageError::Busy)?;

    if !policy_satisfied(policy, signals) {
        return Err(StorageError::NoSuitableVersion);
    }

    let (base_end, cumulatives) = {
        let indices = tablet.indices();
        let base_end = indices.keys().find(|v| v.start == 0).map(|v| v.end).ok_or(StorageError::NoSuitableVersion)?;
        let cumulatives: Vec<Version> = indices.keys().filter(|v| v.start > base_end).copied().collect();
        (base_end, cumulatives)
    };
    if cumulatives.len() < 2 {
        return Err(StorageError::NoSuitableVersion);
    }

    let (cumulatives, stopped_at) = exclude_not_expired_delete(tablet, cumulatives)?;
    if cumulatives.len() < 2 {
        return Err(StorageError::NoSuitableVersion);
    }
    let new_end = match stopped_at {
        Some(limit) => cumulatives.iter().map(|v| v.end).filter(|e| *e <= limit).max(),
        None => cumulatives.iter().map(|v| v.end).max(),
    }
    .ok_or(StorageError::NoSuitableVersion)?;

    let merged_versions: Vec<Version> =
        cumulatives.into_iter().filter(|v| v.end <= new_end).collect();
    if merged_versions.len() < 2 {
        return Err(StorageError::NoSuitableVersion);
    }
    validate_need_merged_versions(&merged_versions, base_end + 1, new_end)?;

    do_merge_and_publish(tablet, &merged_versions, Version::new(base_end + 1, new_end))
}

/// Stop at the first version with an unexpired delete predicate: it and
/// every later candidate are excluded from this round, to preserve the
/// predicate's effect on rows it has not yet been merged past.
fn exclude_not_expired_delete(
    tablet: &Arc<Tablet>,
    mut candidates: Vec<Version>,
) -> Result<(Vec<Version>, Option<i64>)> {
    candidates.sort_by_key(|v| v.end);
    let header = tablet.read_header();
    let mut limit = None;
    for v in &candidates {
        if header.delete_predicates.contains_key(&v.end) {
            limit = Some(v.end);
            break;
        }
    }
    drop(header);
    match limit {
        Some(l) => Ok((candidates.into_iter().filter(|v| v.end <= l).collect(), Some(l))),
        None => Ok((candidates, None)),
    }
}

/// The union of `merged_versions` (plus an implicit base_start) must be
/// a contiguous run with no gaps starting at `start`.
fn validate_need_merged_versions(merged_versions: &[Version], start: i64, end: i64) -> Result<()> {
    let mut covered: Vec<(i64, i64)> = merged_versions.iter().map(|v| (v.start, v.end)).collect();
    covered.sort_unstable();
    let mut cursor = start;
    for (s, e) in covered {
        if s > cursor {
            return Err(StorageError::InvalidArgument(format!(
                "gap in version range before {s}, expected coverage starting at {cursor}"
            )));
        }
        cursor = cursor.max(e + 1);
    }
    if cursor <= end {
        return Err(StorageError::InvalidArgument(format!(
            "merged versions do not reach required end {end}"
        )));
    }
    Ok(())
}

fn do_merge_and_publish(
    tablet: &Arc<Tablet>,
    merged_versions: &[Version],
    new_version: Version,
) -> Result<CompactionOutcome> {
    // Bump refcounts on every source index before releasing the read lock
    // implicitly held by `tablet.indices()` snapshots below.
    let sources: Vec<Arc<OlapIndex>> = {
        let indices = tablet.indices();
        let mut out = Vec::new();
        for v in merged_versions {
            let idx = indices.get(v).ok_or(StorageError::NoSuitableVersion)?.clone();
            idx.acquire();
            out.push(idx);
        }
        out
    };

    let scan_version = new_version.end;
    let handler = DeleteHandler::init(tablet, scan_version)?;

    let merge_result = merge_sources(tablet, &sources, merged_versions, &handler);
    for idx in &sources {
        idx.release();
    }
    let new_index = merge_result?;
    let new_hash = VersionHash(crate::storage::adler32(
        format!("{}-{}", new_version, new_index.row_count).as_bytes(),
    ) as u64);

    {
        let mut header = tablet.write_header();
        header.versions.retain(|v| !merged_versions.contains(v));
        header.versions.push(new_version);
        header.version_hashes.insert(new_version, new_hash);
        drop(header);

        let mut indices = tablet.indices_mut();
        for v in merged_versions {
            indices.remove(v);
        }
        indices.insert(new_version, Arc::new(new_index));
        drop(indices);

        if let Err(e) = tablet.save_header() {
            let mut header = tablet.write_header();
            header.versions.retain(|v| *v != new_version);
            for v in merged_versions {
                header.versions.push(*v);
            }
            header.version_hashes.remove(&new_version);
            drop(header);
            let mut indices = tablet.indices_mut();
            indices.remove(&new_version);
            for (v, idx) in merged_versions.iter().zip(sources.iter()) {
                indices.insert(*v, idx.clone());
            }
            return Err(e);
        }
    }

    Ok(CompactionOutcome { new_version, new_version_hash: new_hash, superseded: merged_versions.to_vec() })
}

/// Merge-read every source in key order, dropping rows any loaded delete
/// predicate fully accepts, and write the survivors into one new index.
fn merge_sources(
    tablet: &Arc<Tablet>,
    sources: &[Arc<OlapIndex>],
    merged_versions: &[Version],
    handler: &DeleteHandler,
) -> Result<OlapIndex> {
    let dir = tablet
        .data_dir
        .join(format!("compacted-{}-{}", merged_versions.iter().map(|v| v.start).min().unwrap_or(0), merged_versions.iter().map(|v| v.end).max().unwrap_or(0)));
    let mut writer = SegmentWriter::init(dir, crate::common::DEFAULT_MAX_SEGMENT_SIZE, crate::common::DEFAULT_ROW_BLOCK_CAPACITY)?;

    for (v, index) in merged_versions.iter().zip(sources.iter()) {
        for row in crate::storage::read_index_rows(index)? {
            if !handler.is_filter_data(v.end, &row) {
                writer.attached_by(row)?;
            }
        }
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ColumnSchema;
    use crate::field::DataType;
    use crate::push::{process, PushRequest, PushType};

    fn tablet() -> Arc<Tablet> {
        let dir = tempfile::tempdir().unwrap();
        let schema = vec![ColumnSchema { id: 0, name: "k1".into(), data_type: DataType::Int32, is_key: true }];
        Arc::new(Tablet::new(1, 1, dir.path().to_path_buf(), schema))
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
    fn compaction_lock_rejects_concurrent_runs() {
        let t = tablet();
        push(&t, 0, 0, 1);
        push(&t, 1, 1, 2);
        let guard = t.try_lock_compaction().unwrap();
        let signals = CompactionSignals { cumulative_delta_count: 10, ..Default::default() };
        let result = run_base_compaction(&t, true, &CompactionPolicy::default(), &signals);
        assert!(matches!(result, Err(StorageError::Busy)));
        drop(guard);
    }

    #[test]
    fn base_compaction_merges_contiguous_versions() {
        let t = tablet();
        push(&t, 0, 0, 1);
        push(&t, 1, 1, 2);
        push(&t, 2, 2, 3);
        let signals = CompactionSignals { cumulative_delta_count: 10, ..Default::default() };
        let outcome = run_base_compaction(&t, true, &CompactionPolicy::default(), &signals).unwrap();
        assert_eq!(outcome.new_version, Version::new(0, 2));
        assert_eq!(outcome.superseded.len(), 3);
        assert!(t.indices().contains_key(&Version::new(0, 2)));
        for v in &outcome.superseded {
            assert!(!t.indices().contains_key(v));
        }
    }

    #[test]
    fn base_compaction_without_policy_and_non_manual_fails() {
        let t = tablet();
        push(&t, 0, 0, 1);
        push(&t, 1, 1, 2);
        let signals = CompactionSignals::default();
        let result = run_base_compaction(&t, false, &CompactionPolicy::default(), &signals);
        assert!(matches!(result, Err(StorageError::NoSuitableVersion)));
    }

    #[test]
    fn cumulative_compaction_leaves_base_untouched() {
        let t = tablet();
        push(&t, 0, 0, 1);
        push(&t, 1, 1, 2);
        push(&t, 2, 2, 3);
        let signals = CompactionSignals { cumulative_delta_count: 10, ..Default::default() };
        let outcome = run_cumulative_compaction(&t, &CompactionPolicy::default(), &signals).unwrap();
        assert_eq!(outcome.new_version, Version::new(1, 2));
        assert!(t.indices().contains_key(&Version::new(0, 0)));
        assert!(t.indices().contains_key(&Version::new(1, 2)));
    }
}
