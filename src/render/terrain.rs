//! Renderer-facing side of the terrain core.
//!
//! The core never talks to a graphics API directly. It walks the quadtree and
//! calls a [`TerrainRenderer`] to bind chunk textures and draw chunk meshes.

use crate::chunk::{ChunkData, ChunkId, ChunkTexture, DrawPath};
use crate::core::types::Vec3;
use crate::math::Aabb;

/// What the current rendering context can do. Built once per context and
/// passed by reference into every render call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderCapabilities {
    /// Vertex shader accepts a morph factor and blends heights itself
    pub vertex_morph_shader: bool,
}

impl Default for RenderCapabilities {
    fn default() -> Self {
        Self { vertex_morph_shader: true }
    }
}

impl RenderCapabilities {
    /// Draw path chunk meshes take under these capabilities.
    pub fn draw_path(&self) -> DrawPath {
        if self.vertex_morph_shader {
            DrawPath::Shader
        } else {
            DrawPath::Cpu
        }
    }
}

/// Per-frame render toggles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderOptions {
    pub morph: bool,
    pub textures: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { morph: true, textures: true }
    }
}

/// Inputs of one render pass.
#[derive(Clone, Copy, Debug)]
pub struct RenderState<'a> {
    pub capabilities: &'a RenderCapabilities,
    pub options: RenderOptions,
}

/// Planar texture-coordinate generation: `u = (x - origin_x) * scale`,
/// `v = (z - origin_z) * scale`, in the local frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TexGen {
    pub origin_x: f32,
    pub origin_z: f32,
    pub scale: f32,
}

impl TexGen {
    /// Stretch one texture across the XZ footprint of `bounds`.
    pub fn covering(bounds: &Aabb) -> Self {
        let size = bounds.size();
        Self {
            origin_x: bounds.min.x,
            origin_z: bounds.min.z,
            scale: 1.0 / size.x.max(size.z).max(f32::EPSILON),
        }
    }

    pub fn uv(&self, x: f32, z: f32) -> (f32, f32) {
        ((x - self.origin_x) * self.scale, (z - self.origin_z) * self.scale)
    }
}

/// One chunk draw call.
#[derive(Clone, Copy, Debug)]
pub struct ChunkDraw<'a> {
    pub chunk: ChunkId,
    pub level: u8,
    pub data: &'a ChunkData,
    /// Blend towards the parent surface (0 = full detail)
    pub morph: f32,
    /// Chunk box in the local frame; decodes packed x/z
    pub bounds: Aabb,
    pub vertical_scale: f32,
    /// Pre-morphed positions on the CPU path
    pub positions: Option<&'a [Vec3]>,
}

/// Graphics backend hooks used by [`crate::tree::ChunkLodTree::render`].
pub trait TerrainRenderer {
    /// Bind a texture for the chunks drawn next.
    fn bind_texture(&mut self, texture: &ChunkTexture, texgen: TexGen);

    /// Draw a chunk. Returns the number of triangles submitted.
    fn draw_chunk(&mut self, draw: &ChunkDraw<'_>) -> u32;
}
