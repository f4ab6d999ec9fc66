//! Picking and elevation queries
//!
//! Both descend the same cut `render` draws: split chunks defer to their
//! children, unsplit chunks answer from their resident mesh with the current
//! morph applied.

use crate::chunk::{ChunkData, ChunkId, ChunkRecord};
use crate::core::types::Vec3;
use crate::math::ray::triangle_height_at;
use crate::math::Ray;
use crate::tree::ChunkLodTree;

/// Nearest surface point found by [`ChunkLodTree::intersect`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// Ray parameter of the hit
    pub t: f32,
    /// Hit position in the local frame
    pub point: Vec3,
    pub chunk: ChunkId,
}

impl ChunkLodTree {
    /// Intersect a local-frame ray with the rendered terrain.
    ///
    /// Children are visited front to back. Unless `exhaustive`, the search
    /// stops at the first chunk with a hit; otherwise every chunk the ray
    /// could still hit closer is tested.
    pub fn intersect(&self, ray: &Ray, exhaustive: bool) -> Option<RayHit> {
        let mut best = None;
        self.intersect_chunk(self.root(), ray, exhaustive, &mut best);
        best
    }

    /// Returns true once a hit ends a non-exhaustive search.
    fn intersect_chunk(
        &self,
        id: ChunkId,
        ray: &Ray,
        exhaustive: bool,
        best: &mut Option<RayHit>,
    ) -> bool {
        let chunk = &self.chunks[id.index()];
        let Some((t_near, _)) = ray.intersects_aabb(&chunk.bounds) else {
            return false;
        };
        if best.is_some_and(|hit| hit.t < t_near) {
            return false;
        }

        if chunk.split {
            let Some(children) = chunk.children else {
                return false;
            };
            let mut order: Vec<(f32, ChunkId)> = children
                .iter()
                .filter_map(|&c| {
                    ray.intersects_aabb(&self.chunks[c.index()].bounds)
                        .map(|(t, _)| (t, c))
                })
                .collect();
            order.sort_by(|a, b| a.0.total_cmp(&b.0));

            for (_, child) in order {
                if self.intersect_chunk(child, ray, exhaustive, best) && !exhaustive {
                    return true;
                }
            }
            return false;
        }

        let Some(data) = chunk.data.as_deref() else {
            return false;
        };

        let mut found = false;
        for [a, b, c] in data.strip_triangles() {
            let (pa, pb, pc) = (
                self.vertex(chunk, data, a),
                self.vertex(chunk, data, b),
                self.vertex(chunk, data, c),
            );
            if let Some(t) = ray.intersects_triangle(pa, pb, pc) {
                if best.is_none_or(|hit| t < hit.t) {
                    *best = Some(RayHit { t, point: ray.at(t), chunk: id });
                    found = true;
                }
            }
        }
        found
    }

    /// Terrain height at a local-frame planar point, taken from the finest
    /// rendered chunk covering it.
    pub fn find_elevation(&self, x: f32, z: f32) -> Option<f32> {
        self.elevation_at(self.root(), x, z)
    }

    /// [`Self::find_elevation`] at a world-space planar point.
    pub fn find_elevation_world(&self, x: f64, z: f64) -> Option<f32> {
        let origin = self.local_origin();
        self.find_elevation((x - origin.x) as f32, (z - origin.y) as f32)
    }

    fn elevation_at(&self, id: ChunkId, x: f32, z: f32) -> Option<f32> {
        let chunk = &self.chunks[id.index()];
        if !chunk.bounds.contains_xz(x, z) {
            return None;
        }

        if chunk.split {
            return chunk
                .children?
                .iter()
                .find_map(|&child| self.elevation_at(child, x, z));
        }

        let data = chunk.data.as_deref()?;
        data.strip_triangles().find_map(|[a, b, c]| {
            triangle_height_at(
                self.vertex(chunk, data, a),
                self.vertex(chunk, data, b),
                self.vertex(chunk, data, c),
                x,
                z,
            )
        })
    }

    /// Morphed local-frame position of one vertex.
    fn vertex(&self, chunk: &ChunkRecord, data: &ChunkData, index: u16) -> Vec3 {
        ChunkData::vertex_position(
            &data.vertices[index as usize],
            &chunk.bounds,
            self.header.vertical_scale,
            chunk.lod.morph_factor(),
        )
    }
}
