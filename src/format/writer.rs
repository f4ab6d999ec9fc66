//! Writing chunk files: typed little-endian writer and a regular-grid tree
//! builder used by tests, benchmarks and tooling.

use std::collections::HashMap;
use std::io::{self, Write};

use crate::chunk::{ChunkData, Direction};
use crate::format::chunk_data::{encoded_size, write_chunk_data};
use crate::format::header::{NodeHeader, TreeHeader, HEADER_SIZE, VERSION_CURRENT};

/// Little-endian typed writer that tracks its byte position.
pub struct ChunkFileWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> ChunkFileWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.write_bytes(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_i16(&mut self, v: i16) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_f32(&mut self, v: f32) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Grid address of a node: (level, x, z).
pub type GridCoord = (u8, u16, u16);

/// A full quadtree over a square grid, labelled in depth-first order.
#[derive(Clone, Copy, Debug)]
pub struct GridTree {
    pub version: u16,
    pub tree_depth: u16,
    pub error_lod_max: f32,
    pub vertical_scale: f32,
    pub base_chunk_dimension: f32,
}

impl Default for GridTree {
    fn default() -> Self {
        Self {
            version: VERSION_CURRENT,
            tree_depth: 3,
            error_lod_max: 8.0,
            vertical_scale: 1.0,
            base_chunk_dimension: 16.0,
        }
    }
}

impl GridTree {
    pub fn header(&self) -> TreeHeader {
        TreeHeader {
            version: self.version,
            tree_depth: self.tree_depth,
            error_lod_max: self.error_lod_max,
            vertical_scale: self.vertical_scale,
            base_chunk_dimension: self.base_chunk_dimension,
            chunk_count: TreeHeader::full_tree_chunk_count(self.tree_depth) as u32,
        }
    }

    /// Nodes in file order. Index in this list is the node's label.
    pub fn file_order(&self) -> Vec<GridCoord> {
        let mut order = Vec::with_capacity(self.header().chunk_count as usize);
        self.visit(0, 0, 0, &mut order);
        order
    }

    fn visit(&self, level: u8, x: u16, z: u16, order: &mut Vec<GridCoord>) {
        order.push((level, x, z));
        if (level as u16) + 1 < self.tree_depth {
            for i in 0..4u16 {
                self.visit(level + 1, 2 * x + (i & 1), 2 * z + (i >> 1), order);
            }
        }
    }

    /// Write the whole file. `chunk` supplies the payload for each node and
    /// is called with the node's grid coordinate and label.
    pub fn write<W: Write>(
        &self,
        out: W,
        mut chunk: impl FnMut(GridCoord, i32) -> ChunkData,
    ) -> io::Result<W> {
        let header = self.header();
        let order = self.file_order();
        let labels: HashMap<GridCoord, i32> = order
            .iter()
            .enumerate()
            .map(|(label, &coord)| (coord, label as i32))
            .collect();

        let payloads: Vec<ChunkData> = order
            .iter()
            .enumerate()
            .map(|(label, &coord)| {
                let mut data = chunk(coord, label as i32);
                data.label = label as i32;
                data
            })
            .collect();

        let mut position = HEADER_SIZE + order.len() as u64 * NodeHeader::size(self.version);
        let mut writer = ChunkFileWriter::new(out);
        header.write(&mut writer)?;

        for (&(level, x, z), data) in order.iter().zip(&payloads) {
            let side = 1i32 << level;
            let mut neighbor_labels = [-1; 4];
            for dir in Direction::ALL {
                let (dx, dz) = dir.offset();
                let (nx, nz) = (x as i32 + dx, z as i32 + dz);
                if (0..side).contains(&nx) && (0..side).contains(&nz) {
                    neighbor_labels[dir as usize] = labels[&(level, nx as u16, nz as u16)];
                }
            }

            let (min_y, max_y) = height_range(data);
            let node = NodeHeader {
                label: labels[&(level, x, z)],
                neighbor_labels,
                level,
                x,
                z,
                min_y,
                max_y,
                vertex_count: Some(data.vertices.len() as u16),
                data_file_position: position as u32,
            };
            node.write(&mut writer, self.version)?;
            position += encoded_size(data);
        }

        for data in &payloads {
            write_chunk_data(&mut writer, data)?;
        }

        Ok(writer.into_inner())
    }
}

/// Vertical extent of a payload, covering both morph endpoints.
pub fn height_range(data: &ChunkData) -> (i16, i16) {
    let mut range: Option<(i16, i16)> = None;
    for v in &data.vertices {
        let morphed = v.y.saturating_add(v.y_delta);
        let lo = v.y.min(morphed);
        let hi = v.y.max(morphed);
        range = Some(match range {
            Some((min, max)) => (min.min(lo), max.max(hi)),
            None => (lo, hi),
        });
    }
    range.unwrap_or((0, 0))
}
