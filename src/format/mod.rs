//! Binary chunk streaming file: header, node records and chunk payloads

pub mod chunk_file;
pub mod header;
pub mod chunk_data;
pub mod writer;

pub use chunk_file::ChunkFile;
pub use header::{NodeHeader, TreeHeader, MAGIC, VERSION_CURRENT, VERSION_LAZY_VERTEX_COUNT};
pub use chunk_data::{read_chunk_data, read_vertex_count, write_chunk_data};
pub use writer::{ChunkFileWriter, GridCoord, GridTree};
