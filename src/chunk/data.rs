//! Resident chunk geometry and textures.

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;

use crate::core::types::Vec3;
use crate::math::Aabb;
use crate::render::{ChunkDraw, TerrainRenderer};

/// Stored x/z of a vertex: +-HALF_SPAN maps to the chunk's +-extent.
pub const VERTEX_HALF_SPAN: f32 = 16384.0;

/// Packed vertex as stored in the chunk file.
///
/// `y_delta` moves the vertex onto the parent's surface when fully morphed.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshVertex {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub y_delta: i16,
}

/// How a chunk reaches the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawPath {
    /// Packed vertices plus a morph factor; the vertex shader blends.
    Shader,
    /// Morphed positions computed here and handed over ready to draw.
    Cpu,
}

/// Geometry of one resident chunk: a triangle strip over packed vertices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkData {
    pub label: i32,
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
    /// Non-degenerate triangles in the strip
    pub triangle_count: u32,
}

impl ChunkData {
    pub fn new(label: i32, vertices: Vec<MeshVertex>, indices: Vec<u16>) -> Self {
        let mut data = Self {
            label,
            vertices,
            indices,
            triangle_count: 0,
        };
        data.triangle_count = data.strip_triangles().count() as u32;
        data
    }

    /// Approximate resident size, for budgeting.
    pub fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.vertices.len() * std::mem::size_of::<MeshVertex>()
            + self.indices.len() * std::mem::size_of::<u16>()
    }

    /// Non-degenerate triangles of the strip, with consistent winding.
    pub fn strip_triangles(&self) -> impl Iterator<Item = [u16; 3]> + '_ {
        self.indices.windows(3).enumerate().filter_map(|(i, w)| {
            let (a, b, c) = (w[0], w[1], w[2]);
            if a == b || b == c || a == c {
                return None;
            }
            Some(if i % 2 == 0 { [a, b, c] } else { [b, a, c] })
        })
    }

    /// Position of a vertex in the local frame.
    pub fn vertex_position(
        vertex: &MeshVertex,
        bounds: &Aabb,
        vertical_scale: f32,
        morph: f32,
    ) -> Vec3 {
        let center = bounds.center();
        let extent = bounds.half_extent();
        let y = vertex.y as f32 + morph * vertex.y_delta as f32;
        Vec3::new(
            center.x + vertex.x as f32 / VERTEX_HALF_SPAN * extent.x,
            y * vertical_scale,
            center.z + vertex.z as f32 / VERTEX_HALF_SPAN * extent.z,
        )
    }

    /// All vertex positions in the local frame, morphed by `morph`.
    pub fn positions(&self, bounds: &Aabb, vertical_scale: f32, morph: f32) -> Vec<Vec3> {
        self.vertices
            .iter()
            .map(|v| Self::vertex_position(v, bounds, vertical_scale, morph))
            .collect()
    }

    /// Hand this chunk to the renderer along the chosen path.
    pub fn draw(
        &self,
        path: DrawPath,
        renderer: &mut dyn TerrainRenderer,
        draw: ChunkDraw<'_>,
    ) -> u32 {
        match path {
            DrawPath::Shader => renderer.draw_chunk(&draw),
            DrawPath::Cpu => {
                let positions = self.positions(&draw.bounds, draw.vertical_scale, draw.morph);
                // Already morphed
                let draw = ChunkDraw {
                    positions: Some(&positions),
                    morph: 0.0,
                    ..draw
                };
                renderer.draw_chunk(&draw)
            }
        }
    }
}

/// Texture tile bound to a chunk.
#[derive(Clone, Debug)]
pub struct ChunkTexture {
    pub image: RgbaImage,
}

impl ChunkTexture {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn byte_size(&self) -> usize {
        self.image.as_raw().len()
    }
}
