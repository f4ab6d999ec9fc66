//! Frustum culling and rendering of the split tree

use crate::chunk::{ChunkId, DrawPath};
use crate::math::frustum::{CullResult, Frustum};
use crate::render::{ChunkDraw, RenderState, TerrainRenderer, TexGen};
use crate::tree::ChunkLodTree;

/// Per-render bookkeeping.
struct RenderPass<'a> {
    renderer: &'a mut dyn TerrainRenderer,
    path: DrawPath,
    morph: bool,
    textures: bool,
    /// Chunk whose texture is currently bound
    bound: Option<ChunkId>,
    rendered: u32,
}

impl ChunkLodTree {
    /// Mark chunks outside `frustum` so `render` skips them. Only the split
    /// part of the tree is visited. Returns the number of culled chunks.
    pub fn cull(&mut self, frustum: &Frustum) -> u32 {
        let mut culled = 0;
        self.cull_chunk(self.root(), frustum, CullResult::ALL_PLANES, &mut culled);
        self.stats.culled_chunks = culled;
        culled
    }

    fn cull_chunk(&mut self, id: ChunkId, frustum: &Frustum, parent: CullResult, culled: &mut u32) {
        let chunk = &mut self.chunks[id.index()];
        let result = frustum.classify_aabb(&chunk.bounds, parent);
        chunk.cull = result;

        if result.culled {
            *culled += 1;
            return;
        }
        if !chunk.split {
            return;
        }
        if let Some(children) = chunk.children {
            for child in children {
                self.cull_chunk(child, frustum, result, culled);
            }
        }
    }

    /// Draw the current cut through the tree. Returns the number of
    /// triangles submitted.
    pub fn render(&mut self, renderer: &mut dyn TerrainRenderer, state: &RenderState<'_>) -> u32 {
        let mut pass = RenderPass {
            renderer,
            path: state.capabilities.draw_path(),
            morph: state.options.morph,
            textures: state.options.textures,
            bound: None,
            rendered: 0,
        };

        let triangles = self.render_chunk(self.root(), None, &mut pass);

        self.stats.rendered_chunks = pass.rendered;
        self.stats.triangles = triangles;
        triangles
    }

    /// `inherited` is the nearest textured ancestor; chunks without their
    /// own texture are drawn with it.
    fn render_chunk(&self, id: ChunkId, inherited: Option<ChunkId>, pass: &mut RenderPass<'_>) -> u32 {
        let chunk = &self.chunks[id.index()];
        if chunk.is_culled() {
            return 0;
        }

        let texture_owner = if pass.textures && chunk.has_texture() {
            Some(id)
        } else {
            inherited
        };

        if chunk.split {
            let Some(children) = chunk.children else {
                return 0;
            };
            return children
                .iter()
                .map(|&child| self.render_chunk(child, texture_owner, pass))
                .sum();
        }

        let Some(data) = chunk.data.as_deref() else {
            return 0;
        };

        if texture_owner != pass.bound {
            if let Some(owner) = texture_owner {
                let owner = &self.chunks[owner.index()];
                if let Some(texture) = &owner.texture {
                    pass.renderer.bind_texture(texture, TexGen::covering(&owner.bounds));
                }
            }
            pass.bound = texture_owner;
        }

        let morph = if pass.morph { chunk.lod.morph_factor() } else { 0.0 };
        pass.rendered += 1;
        data.draw(
            pass.path,
            pass.renderer,
            ChunkDraw {
                chunk: id,
                level: chunk.level,
                data,
                morph,
                bounds: chunk.bounds,
                vertical_scale: self.header.vertical_scale,
                positions: None,
            },
        )
    }
}
