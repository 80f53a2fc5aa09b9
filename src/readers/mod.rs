pub mod chunk_reader;

pub use chunk_reader::{ChunkIterator, ChunkedReader, ColumnIndex, RecordChunk};
