//! The chunk LOD quadtree
//!
//! [`ChunkLodTree`] owns every chunk record of a terrain file in one arena,
//! decides each frame which chunks are split (see [`lod`]), keeps bounding
//! boxes in a relocatable local frame (see [`bounds`]) and answers render and
//! picking traversals (see [`traverse`] and [`query`]).

pub mod bounds;
pub mod lod;
pub mod traverse;
pub mod query;

#[cfg(test)]
mod tests;

use std::io::{Read, Seek};
use std::path::Path;

use crate::chunk::{ChunkId, ChunkRecord, Neighbor};
use crate::core::error::Error;
use crate::core::types::{DVec2, Result};
use crate::format::{read_vertex_count, ChunkFile, NodeHeader, TreeHeader, VERSION_CURRENT};
use crate::streaming::{ResidencyBudget, TextureSource};

pub use lod::{desired_lod, MAX_ALLOWED_NEIGHBOR_DIFFERENCE};
pub use query::RayHit;

/// Counters refreshed by `update` and `render`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub chunk_count: u32,
    pub resident_chunks: u32,
    pub resident_textures: u32,
    pub pending_loads: u32,
    pub split_chunks: u32,
    /// Chunks drawn by the last render
    pub rendered_chunks: u32,
    /// Chunks rejected by the last cull
    pub culled_chunks: u32,
    /// Triangles submitted by the last render
    pub triangles: u32,
}

/// Texture quadtree shape, taken from the texture source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct TextureInfo {
    depth: u32,
    tile_size: u32,
}

/// Streaming quadtree of terrain chunks.
pub struct ChunkLodTree {
    header: TreeHeader,
    /// Arena, in file (depth-first) order; index 0 is the root
    chunks: Vec<ChunkRecord>,

    // Quality and camera parameters
    max_pixel_error: f32,
    max_texel_size: f32,
    screen_width: f32,
    horizontal_fov_degrees: f32,
    distance_lod_max: f32,
    texture_distance_lod_max: f32,
    textures: Option<TextureInfo>,

    // Relocatable origin
    lattice_width: f64,
    lattice_cell: (i64, i64),
    origin: DVec2,
    /// Last camera position given to `set_camera_position` (world XZ)
    camera_position: DVec2,

    budget: ResidencyBudget,
    /// Geometry released at the end of the current update
    unload_queue: Vec<ChunkId>,
    /// Number of updates run so far
    frame: u64,
    stats: TreeStats,
}

impl ChunkLodTree {
    /// Open a chunk file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let tree = Self::from_file(ChunkFile::open(path)?)?;
        log::info!(
            "Opened terrain {} ({} chunks, depth {})",
            path.display(),
            tree.chunk_count(),
            tree.tree_depth()
        );
        Ok(tree)
    }

    /// Read the header and every node record, link the quadtree and compute
    /// bounding boxes around an origin at the root's center.
    pub fn from_file<R: Read + Seek>(mut file: ChunkFile<R>) -> Result<Self> {
        let header = TreeHeader::read(&mut file)?;
        let count = header.chunk_count;

        // Node records follow the header back to back
        let available = file.remaining()?;
        let needed = count as u64 * NodeHeader::size(header.version);
        if needed > available {
            return Err(Error::Format(format!(
                "{} chunk records need {} bytes, file has {} after the header",
                count, needed, available
            )));
        }

        let mut chunks = Vec::with_capacity(count as usize);
        read_subtree(&mut file, &header, 0, None, &mut chunks)?;

        // Version 9 keeps vertex counts only in the payloads
        if header.version < VERSION_CURRENT {
            for chunk in &mut chunks {
                chunk.vertex_count = read_vertex_count(&mut file, chunk.data_file_position)?;
            }
        }

        let mut chunk_table: Vec<Option<ChunkId>> = vec![None; count as usize];
        for (index, chunk) in chunks.iter().enumerate() {
            let slot = usize::try_from(chunk.label)
                .ok()
                .and_then(|label| chunk_table.get_mut(label))
                .ok_or(Error::Range { label: chunk.label, count })?;
            if slot.is_some() {
                return Err(Error::Format(format!("duplicate chunk label {}", chunk.label)));
            }
            *slot = Some(ChunkId(index as u32));
        }

        lookup_neighbors(&mut chunks, &chunk_table, count);

        let mut tree = Self {
            header,
            chunks,
            max_pixel_error: 5.0,
            max_texel_size: 1.0,
            screen_width: 1024.0,
            horizontal_fov_degrees: 90.0,
            distance_lod_max: 0.0,
            texture_distance_lod_max: 0.0,
            textures: None,
            lattice_width: 1000.0,
            lattice_cell: (0, 0),
            origin: DVec2::ZERO,
            camera_position: DVec2::ZERO,
            budget: ResidencyBudget::default(),
            unload_queue: Vec::new(),
            frame: 0,
            stats: TreeStats::default(),
        };
        tree.update_thresholds();
        tree.update_origin();
        tree.refresh_stats();
        Ok(tree)
    }

    // --- Settings ---

    /// Screen-space error and texel-size tolerances, in pixels.
    pub fn set_quality(&mut self, max_pixel_error: f32, max_texel_size: f32) {
        self.max_pixel_error = max_pixel_error.max(f32::EPSILON);
        self.max_texel_size = max_texel_size.max(f32::EPSILON);
        self.update_thresholds();
    }

    pub fn set_camera_parameters(&mut self, screen_width_pixels: f32, horizontal_fov_degrees: f32) {
        self.screen_width = screen_width_pixels;
        self.horizontal_fov_degrees = horizontal_fov_degrees;
        self.update_thresholds();
    }

    /// Enable texture LOD against a texture quadtree of the source's shape.
    pub fn set_texture_source(&mut self, source: &dyn TextureSource) {
        self.textures = Some(TextureInfo {
            depth: source.depth(),
            tile_size: source.tile_size().max(1),
        });
        self.update_thresholds();
    }

    /// Replace the budget limits, keeping current usage.
    pub fn set_budget(&mut self, budget: ResidencyBudget) {
        self.budget = self.budget.with_limits_of(&budget);
    }

    /// Recompute the distance thresholds from quality and camera settings.
    fn update_thresholds(&mut self) {
        let half_fov = (self.horizontal_fov_degrees.to_radians() * 0.5).tan();
        let k = self.screen_width / half_fov.max(f32::EPSILON);

        self.distance_lod_max = self.header.error_lod_max / self.max_pixel_error * k;

        self.texture_distance_lod_max = match self.textures {
            Some(info) if info.depth > 0 => {
                let finest_tile = self.root_size() as f32 / (1u64 << (info.depth - 1)) as f32;
                let texel_spacing = finest_tile / info.tile_size as f32;
                texel_spacing / self.max_texel_size * k
            }
            _ => 0.0,
        };

        log::debug!(
            "LOD thresholds: geometry {:.1}, texture {:.1}",
            self.distance_lod_max,
            self.texture_distance_lod_max
        );
    }

    // --- Accessors ---

    pub fn header(&self) -> &TreeHeader {
        &self.header
    }

    pub fn tree_depth(&self) -> u16 {
        self.header.tree_depth
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn vertical_scale(&self) -> f32 {
        self.header.vertical_scale
    }

    pub fn distance_lod_max(&self) -> f32 {
        self.distance_lod_max
    }

    pub fn texture_distance_lod_max(&self) -> f32 {
        self.texture_distance_lod_max
    }

    pub fn root(&self) -> ChunkId {
        ChunkId(0)
    }

    pub fn chunk(&self, id: ChunkId) -> &ChunkRecord {
        &self.chunks[id.index()]
    }

    pub fn chunks(&self) -> impl Iterator<Item = (ChunkId, &ChunkRecord)> + '_ {
        self.chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (ChunkId(i as u32), c))
    }

    /// Chunk with the given file label.
    pub fn find_label(&self, label: i32) -> Option<ChunkId> {
        self.chunks().find(|(_, c)| c.label == label).map(|(id, _)| id)
    }

    pub fn budget(&self) -> &ResidencyBudget {
        &self.budget
    }

    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    fn refresh_stats(&mut self) {
        let mut stats = TreeStats {
            chunk_count: self.chunks.len() as u32,
            rendered_chunks: self.stats.rendered_chunks,
            culled_chunks: self.stats.culled_chunks,
            triangles: self.stats.triangles,
            ..Default::default()
        };
        for chunk in &self.chunks {
            stats.resident_chunks += chunk.has_resident_data() as u32;
            stats.resident_textures += chunk.has_texture() as u32;
            stats.pending_loads += chunk.load_pending as u32 + chunk.texture_pending as u32;
            stats.split_chunks += chunk.split as u32;
        }
        self.stats = stats;
    }
}

/// Read one node record and, below the deepest level, its four children.
fn read_subtree<R: Read + Seek>(
    file: &mut ChunkFile<R>,
    header: &TreeHeader,
    level: u8,
    parent: Option<ChunkId>,
    chunks: &mut Vec<ChunkRecord>,
) -> Result<ChunkId> {
    let node = NodeHeader::read(file, header.version)?;
    if node.level != level {
        return Err(Error::Format(format!(
            "chunk {} has level {} at tree depth {}",
            node.label, node.level, level
        )));
    }

    let id = ChunkId(chunks.len() as u32);
    if id.0 >= header.chunk_count {
        return Err(Error::Range { label: node.label, count: header.chunk_count });
    }

    let mut record = ChunkRecord::new(node.label, node.level, node.x, node.z);
    record.parent = parent;
    record.min_y = node.min_y;
    record.max_y = node.max_y;
    record.data_file_position = node.data_file_position;
    record.vertex_count = node.vertex_count.unwrap_or(0);
    for (slot, &label) in record.neighbors.iter_mut().zip(&node.neighbor_labels) {
        slot.label = label;
    }
    chunks.push(record);

    if (level as u16) + 1 < header.tree_depth {
        let mut children = [ChunkId(0); 4];
        for child in &mut children {
            *child = read_subtree(file, header, level + 1, Some(id), chunks)?;
        }
        chunks[id.index()].children = Some(children);
    }

    Ok(id)
}

/// Resolve neighbor labels to arena handles. Bad labels become tree edges.
fn lookup_neighbors(chunks: &mut [ChunkRecord], chunk_table: &[Option<ChunkId>], count: u32) {
    for chunk in chunks.iter_mut() {
        for neighbor in chunk.neighbors.iter_mut() {
            if neighbor.label < 0 {
                *neighbor = Neighbor::NONE;
                continue;
            }
            match chunk_table.get(neighbor.label as usize).copied().flatten() {
                Some(id) => neighbor.chunk = Some(id),
                None => {
                    log::warn!(
                        "Chunk {}: {}; treating as tree edge",
                        chunk.label,
                        Error::Range { label: neighbor.label, count }
                    );
                    *neighbor = Neighbor::NONE;
                }
            }
        }
    }
}
