//! Tree header and per-node records of the chunk file.

use std::io::{Read, Seek, Write};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::format::chunk_file::ChunkFile;
use crate::format::writer::ChunkFileWriter;

/// File magic tag.
pub const MAGIC: [u8; 3] = *b"CHU";

/// Version without per-node vertex counts.
pub const VERSION_LAZY_VERTEX_COUNT: u16 = 9;
/// Current version; node records carry their vertex count.
pub const VERSION_CURRENT: u16 = 10;

/// Deepest tree the packed LOD and u16 grid coordinates can address.
pub const MAX_TREE_DEPTH: u16 = 16;

/// Header size in bytes.
pub const HEADER_SIZE: u64 = 3 + 2 + 2 + 4 + 4 + 4 + 4;

/// Tree-wide parameters at the start of the file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeHeader {
    pub version: u16,
    pub tree_depth: u16,
    pub error_lod_max: f32,
    pub vertical_scale: f32,
    pub base_chunk_dimension: f32,
    pub chunk_count: u32,
}

impl TreeHeader {
    /// Number of nodes in a full quadtree of `depth` levels.
    pub fn full_tree_chunk_count(depth: u16) -> u64 {
        // (4^depth - 1) / 3
        ((1u64 << (2 * depth as u64)) - 1) / 3
    }

    pub fn read<R: Read + Seek>(file: &mut ChunkFile<R>) -> Result<Self> {
        let magic = file.read_bytes(MAGIC.len())?;
        if magic != MAGIC {
            return Err(Error::Format(format!("bad magic tag {:?}", magic)));
        }

        let version = file.read_u16()?;
        if version != VERSION_LAZY_VERTEX_COUNT && version != VERSION_CURRENT {
            return Err(Error::Format(format!("unsupported format version {}", version)));
        }

        let header = Self {
            version,
            tree_depth: file.read_u16()?,
            error_lod_max: file.read_f32()?,
            vertical_scale: file.read_f32()?,
            base_chunk_dimension: file.read_f32()?,
            chunk_count: file.read_u32()?,
        };
        header.validate()?;
        Ok(header)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tree_depth == 0 || self.tree_depth > MAX_TREE_DEPTH {
            return Err(Error::Format(format!("tree depth {} out of range", self.tree_depth)));
        }
        let expected = Self::full_tree_chunk_count(self.tree_depth);
        if self.chunk_count as u64 != expected {
            return Err(Error::Format(format!(
                "chunk count {} does not match depth {} (expected {})",
                self.chunk_count, self.tree_depth, expected
            )));
        }
        if !(self.base_chunk_dimension > 0.0) || !(self.vertical_scale > 0.0) {
            return Err(Error::Format("non-positive scale factors".into()));
        }
        Ok(())
    }

    pub fn write<W: Write>(&self, out: &mut ChunkFileWriter<W>) -> std::io::Result<()> {
        out.write_bytes(&MAGIC)?;
        out.write_u16(self.version)?;
        out.write_u16(self.tree_depth)?;
        out.write_f32(self.error_lod_max)?;
        out.write_f32(self.vertical_scale)?;
        out.write_f32(self.base_chunk_dimension)?;
        out.write_u32(self.chunk_count)
    }
}

/// One node record as stored in the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeHeader {
    pub label: i32,
    pub neighbor_labels: [i32; 4],
    pub level: u8,
    pub x: u16,
    pub z: u16,
    pub min_y: i16,
    pub max_y: i16,
    /// Absent in version 9 files
    pub vertex_count: Option<u16>,
    pub data_file_position: u32,
}

impl NodeHeader {
    /// Record size in bytes for a format version.
    pub fn size(version: u16) -> u64 {
        let base = 4 + 4 * 4 + 1 + 2 + 2 + 2 + 2 + 4;
        if version >= VERSION_CURRENT { base + 2 } else { base }
    }

    pub fn read<R: Read + Seek>(file: &mut ChunkFile<R>, version: u16) -> Result<Self> {
        let label = file.read_i32()?;
        let mut neighbor_labels = [-1; 4];
        for slot in &mut neighbor_labels {
            *slot = file.read_i32()?;
        }
        let level = file.read_u8()?;
        let x = file.read_u16()?;
        let z = file.read_u16()?;
        let min_y = file.read_i16()?;
        let max_y = file.read_i16()?;
        let vertex_count = if version >= VERSION_CURRENT {
            Some(file.read_u16()?)
        } else {
            None
        };
        let data_file_position = file.read_u32()?;

        Ok(Self {
            label,
            neighbor_labels,
            level,
            x,
            z,
            min_y,
            max_y,
            vertex_count,
            data_file_position,
        })
    }

    pub fn write<W: Write>(&self, out: &mut ChunkFileWriter<W>, version: u16) -> std::io::Result<()> {
        out.write_i32(self.label)?;
        for &label in &self.neighbor_labels {
            out.write_i32(label)?;
        }
        out.write_u8(self.level)?;
        out.write_u16(self.x)?;
        out.write_u16(self.z)?;
        out.write_i16(self.min_y)?;
        out.write_i16(self.max_y)?;
        if version >= VERSION_CURRENT {
            out.write_u16(self.vertex_count.unwrap_or(0))?;
        }
        out.write_u32(self.data_file_position)
    }
}
