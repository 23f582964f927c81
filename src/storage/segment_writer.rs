//! Column segment writer: buffers rows into growing blocks, rolls to new
//! segment files on size bound, and finalizes into one [`OlapIndex`].
//!
//! Grounded in the original `ColumnDataWriter`/`IWriter` shape: `init`,
//! `attached_by`/`write_row_block`, internal `_add_segment`/
//! `_finalize_segment`, and a single `finalize()` that yields the index.
//! Each flushed block is framed as `[len: u32][bincode-encoded rows]`, the
//! same length-prefix convention [`crate::storage::binary_reader`] uses, so
//! [`crate::storage::segment_reader`] can read a segment back without a
//! side-channel schema.

use crate::common::{ColumnId, SegmentId};
use crate::error::{Result, StorageError};
use crate::field::Field;
use crate::storage::checksum::Adler32;
use crate::storage::olap_index::OlapIndex;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

/// A batch of decoded rows, grown one row at a time until it is flushed.
#[derive(Debug, Default, Clone)]
pub struct RowBlock {
    pub rows: Vec<HashMap<ColumnId, Option<Field>>>,
}

impl RowBlock {
    pub fn is_full(&self, capacity: usize) -> bool {
        self.rows.len() >= capacity
    }

    fn encode(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(&self.rows, bincode::config::standard()).map_err(StorageError::from)
    }
}

/// The on-disk file name for one segment, shared between the writer and
/// [`crate::storage::segment_reader`] so the latter can locate files by id.
pub fn segment_file_name(id: SegmentId) -> String {
    format!("segment_{id:08}.dat")
}

struct ActiveSegment {
    id: SegmentId,
    path: PathBuf,
    file: std::fs::File,
    written: u64,
}

pub struct SegmentWriter {
    dir: PathBuf,
    max_segment_size: u64,
    row_block_capacity: usize,
    block: RowBlock,
    active: Option<ActiveSegment>,
    next_segment_id: SegmentId,
    completed_segments: Vec<SegmentId>,
    completed_paths: Vec<PathBuf>,
    total_rows: u64,
    checksum: Adler32,
    column_stats: HashMap<ColumnId, (Field, Field)>,
}

impl SegmentWriter {
    pub fn init(dir: PathBuf, max_segment_size: u64, row_block_capacity: usize) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let mut writer = Self {
            dir,
            max_segment_size,
            row_block_capacity,
            block: RowBlock::default(),
            active: None,
            next_segment_id: 0,
            completed_segments: Vec::new(),
            completed_paths: Vec::new(),
            total_rows: 0,
            checksum: Adler32::new(),
            column_stats: HashMap::new(),
        };
        writer.add_segment()?;
        Ok(writer)
    }

    fn add_segment(&mut self) -> Result<()> {
        if let Some(active) = self.active.take() {
            self.completed_paths.push(active.path.clone());
            self.completed_segments.push(active.id);
        }
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        let path = self.dir.join(segment_file_name(id));
        let file = std::fs::File::create(&path)?;
        self.active = Some(ActiveSegment { id, path, file, written: 0 });
        Ok(())
    }

    /// Append one row, updating running per-column min/max stats.
    pub fn attached_by(&mut self, row: HashMap<ColumnId, Option<Field>>) -> Result<()> {
        for (col, value) in row.iter() {
            if let Some(v) = value {
                self.column_stats
                    .entry(*col)
                    .and_modify(|(min, max)| {
                        if v.cmp_field(min) == Some(std::cmp::Ordering::Less) {
                            *min = v.clone();
                        }
                        if v.cmp_field(max) == Some(std::cmp::Ordering::Greater) {
                            *max = v.clone();
                        }
                    })
                    .or_insert_with(|| (v.clone(), v.clone()));
            }
        }
        self.block.rows.push(row);
        if self.block.is_full(self.row_block_capacity) {
            self.flush_block()?;
        }
        Ok(())
    }

    pub fn write_row_block(&mut self, block: RowBlock) -> Result<()> {
        for row in block.rows {
            self.attached_by(row)?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block.rows.is_empty() {
            return Ok(());
        }
        let payload = self.block.encode()?;
        let framed_len = payload.len() as u64 + 4;
        let active = self.active.as_ref().expect("segment writer always has an active segment");
        if active.written + framed_len > self.max_segment_size {
            self.add_segment()?;
        }

        self.total_rows += self.block.rows.len() as u64;
        let len_prefix = (payload.len() as u32).to_le_bytes();
        self.checksum.update(&len_prefix);
        self.checksum.update(&payload);

        let active = self.active.as_mut().expect("segment writer always has an active segment");
        active.file.write_all(&len_prefix).map_err(StorageError::Io)?;
        active.file.write_all(&payload).map_err(StorageError::Io)?;
        active.written += framed_len;
        self.block = RowBlock::default();
        Ok(())
    }

    pub fn written_bytes(&self) -> u64 {
        self.active.as_ref().map(|a| a.written).unwrap_or(0)
    }

    /// Flush the last block, close the current segment, and produce the
    /// one [`OlapIndex`] this writer's lifetime yields.
    pub fn finalize(mut self) -> Result<OlapIndex> {
        self.flush_block()?;
        if let Some(active) = self.active.take() {
            active.file.sync_all()?;
            self.completed_paths.push(active.path.clone());
            self.completed_segments.push(active.id);
        }

        let mut segment_paths = self.completed_paths.clone();
        segment_paths.sort();

        let mut checksum_over_files = Adler32::new();
        for path in &segment_paths {
            let contents = std::fs::read(path)?;
            checksum_over_files.update(&contents);
        }

        Ok(OlapIndex::new(
            self.dir,
            self.completed_segments,
            self.total_rows,
            checksum_over_files.finish(),
            self.column_stats,
        ))
    }
}
