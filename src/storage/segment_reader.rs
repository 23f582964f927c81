//! Reads back rows a [`SegmentWriter`](crate::storage::segment_writer::SegmentWriter)
//! wrote, by walking an [`OlapIndex`]'s segment files in id order and
//! decoding the same `[len: u32][bincode rows]` framing the writer produced.
//! Compaction's merge step is this reader's only consumer.

use crate::common::ColumnId;
use crate::error::{Result, StorageError};
use crate::field::Field;
use crate::storage::olap_index::OlapIndex;
use crate::storage::segment_writer::segment_file_name;
use std::collections::HashMap;

pub type Row = HashMap<ColumnId, Option<Field>>;

/// Every row recorded across `index`'s segment files, in segment id order.
pub fn read_index_rows(index: &OlapIndex) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for &segment_id in &index.segments {
        let path = index.dir.join(segment_file_name(segment_id));
        let bytes = std::fs::read(&path).map_err(StorageError::Io)?;

        let mut cursor = 0usize;
        while cursor < bytes.len() {
            if cursor + 4 > bytes.len() {
                return Err(StorageError::InvalidArgument(format!(
                    "segment {} truncated at offset {cursor}",
                    path.display()
                )));
            }
            let len = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
            cursor += 4;
            if cursor + len > bytes.len() {
                return Err(StorageError::InvalidArgument(format!(
                    "segment {} truncated block at offset {cursor}",
                    path.display()
                )));
            }
            let block: Vec<Row> =
                bincode::serde::decode_from_slice(&bytes[cursor..cursor + len], bincode::config::standard())
                    .map(|(rows, _)| rows)
                    .map_err(StorageError::from)?;
            rows.extend(block);
            cursor += len;
        }
    }
    Ok(rows)
}
