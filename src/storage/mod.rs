pub mod binary_reader;
pub mod checksum;
pub mod olap_index;
pub mod segment_reader;
pub mod segment_writer;

pub use checksum::{adler32, Adler32};
pub use olap_index::OlapIndex;
pub use segment_reader::read_index_rows;
pub use segment_writer::{RowBlock, SegmentWriter};
