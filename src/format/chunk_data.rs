//! Per-chunk geometry payload stored at a node's data file position.
//!
//! Layout: i32 label, u16 vertex count, vertices (4 x i16 each), u32 index
//! count, u16 strip indices, u32 triangle count.

use std::io::{Read, Seek, Write};

use crate::chunk::{ChunkData, MeshVertex};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::format::chunk_file::ChunkFile;
use crate::format::writer::ChunkFileWriter;

/// Encoded size of a payload in bytes.
pub fn encoded_size(data: &ChunkData) -> u64 {
    (4 + 2 + data.vertices.len() * 8 + 4 + data.indices.len() * 2 + 4) as u64
}

/// Read only the vertex count, for version 9 files that omit it from the
/// node record.
pub fn read_vertex_count<R: Read + Seek>(file: &mut ChunkFile<R>, position: u32) -> Result<u16> {
    file.seek(position as u64)?;
    let _label = file.read_i32()?;
    Ok(file.read_u16()?)
}

/// Decode the payload at `position`, checking it belongs to `label`.
pub fn read_chunk_data<R: Read + Seek>(
    file: &mut ChunkFile<R>,
    position: u32,
    label: i32,
) -> Result<ChunkData> {
    file.seek(position as u64)?;

    let stored_label = file.read_i32()?;
    if stored_label != label {
        return Err(Error::Format(format!(
            "chunk data at {} belongs to label {}, expected {}",
            position, stored_label, label
        )));
    }

    let vertex_count = file.read_u16()? as usize;
    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        vertices.push(MeshVertex {
            x: file.read_i16()?,
            y: file.read_i16()?,
            z: file.read_i16()?,
            y_delta: file.read_i16()?,
        });
    }

    let index_count = file.read_u32()? as usize;
    // Indices plus the trailing triangle count must still be in the file
    let available = file.remaining()?;
    if (index_count as u64) * 2 + 4 > available {
        return Err(Error::Format(format!(
            "chunk {}: {} indices exceed the {} bytes left in the file",
            label, index_count, available
        )));
    }
    let mut indices = Vec::with_capacity(index_count);
    for _ in 0..index_count {
        let index = file.read_u16()?;
        if index as usize >= vertex_count {
            return Err(Error::Format(format!(
                "chunk {}: index {} out of range ({} vertices)",
                label, index, vertex_count
            )));
        }
        indices.push(index);
    }

    let triangle_count = file.read_u32()?;

    Ok(ChunkData {
        label,
        vertices,
        indices,
        triangle_count,
    })
}

pub fn write_chunk_data<W: Write>(out: &mut ChunkFileWriter<W>, data: &ChunkData) -> std::io::Result<()> {
    out.write_i32(data.label)?;
    out.write_u16(data.vertices.len() as u16)?;
    for v in &data.vertices {
        out.write_i16(v.x)?;
        out.write_i16(v.y)?;
        out.write_i16(v.z)?;
        out.write_i16(v.y_delta)?;
    }
    out.write_u32(data.indices.len() as u32)?;
    for &index in &data.indices {
        out.write_u16(index)?;
    }
    out.write_u32(data.triangle_count)
}
