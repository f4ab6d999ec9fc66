//! Bounding boxes and the relocatable local frame
//!
//! World positions are f64. Everything the tree hands out (boxes, vertex
//! positions, query results) is f32 relative to a local origin that moves in
//! whole lattice cells as the camera travels, so coordinates near the camera
//! stay small. Boxes are always rebuilt from the integer grid fields, never
//! shifted incrementally, so recentering cannot accumulate error.

use rayon::prelude::*;

use crate::chunk::ChunkRecord;
use crate::core::types::{DVec2, DVec3, Vec3};
use crate::math::Aabb;
use crate::tree::ChunkLodTree;

/// Everything needed to place a chunk's box, detached from the tree so the
/// arena can be rebuilt in parallel.
#[derive(Clone, Copy, Debug)]
struct BoundsFrame {
    tree_depth: u16,
    base_chunk_dimension: f64,
    vertical_scale: f64,
    half_size: f64,
    origin: DVec2,
}

impl BoundsFrame {
    fn chunk_bounds(&self, chunk: &ChunkRecord) -> Aabb {
        let level_factor = (1u64 << (self.tree_depth as u32 - 1 - chunk.level as u32)) as f64;
        let size = level_factor * self.base_chunk_dimension;
        let half = size * 0.5;

        let cx = (chunk.x as f64 + 0.5) * size - self.half_size - self.origin.x;
        let cz = (chunk.z as f64 + 0.5) * size - self.half_size - self.origin.y;
        let min_y = chunk.min_y as f64 * self.vertical_scale;
        let max_y = chunk.max_y as f64 * self.vertical_scale;

        Aabb::new(
            Vec3::new((cx - half) as f32, min_y as f32, (cz - half) as f32),
            Vec3::new((cx + half) as f32, max_y as f32, (cz + half) as f32),
        )
    }
}

/// Lattice cell containing a world position.
fn lattice_cell(x: f64, z: f64, width: f64) -> (i64, i64) {
    ((x / width).floor() as i64, (z / width).floor() as i64)
}

impl ChunkLodTree {
    /// Edge length of the whole terrain in world units.
    pub fn root_size(&self) -> f64 {
        self.header.base_chunk_dimension as f64 * (1u64 << (self.header.tree_depth - 1)) as f64
    }

    /// World-space XZ position of the local frame's origin.
    pub fn local_origin(&self) -> DVec2 {
        self.origin
    }

    pub fn lattice_width(&self) -> f64 {
        self.lattice_width
    }

    /// Change the lattice cell size and re-snap the origin around the last
    /// camera position.
    pub fn set_lattice_width(&mut self, width: f64) {
        if !(width > 0.0) {
            log::warn!("Ignoring non-positive lattice width {}", width);
            return;
        }
        self.lattice_width = width;
        let camera = self.camera_position;
        self.lattice_cell = (i64::MIN, i64::MIN);
        self.set_camera_position(camera.x, camera.y);
    }

    /// Tell the tree where the camera is in world XZ. The origin moves only
    /// when the camera enters a different lattice cell; returns whether it
    /// moved.
    ///
    /// Cells are floored: the origin is `floor(p / width) * width`, so it sits
    /// at the cell's lower corner rather than the nearest lattice point.
    pub fn set_camera_position(&mut self, x: f64, z: f64) -> bool {
        self.camera_position = DVec2::new(x, z);

        let cell = lattice_cell(x, z, self.lattice_width);
        if cell == self.lattice_cell {
            return false;
        }
        self.lattice_cell = cell;

        let origin = DVec2::new(cell.0 as f64, cell.1 as f64) * self.lattice_width;
        if origin == self.origin {
            return false;
        }

        log::info!(
            "Local origin moved from ({}, {}) to ({}, {})",
            self.origin.x,
            self.origin.y,
            origin.x,
            origin.y
        );
        self.origin = origin;
        self.update_origin();
        true
    }

    /// Rebuild every chunk's bounding box against the current origin.
    pub fn update_origin(&mut self) {
        let frame = BoundsFrame {
            tree_depth: self.header.tree_depth,
            base_chunk_dimension: self.header.base_chunk_dimension as f64,
            vertical_scale: self.header.vertical_scale as f64,
            half_size: self.root_size() * 0.5,
            origin: self.origin,
        };

        self.chunks
            .par_iter_mut()
            .for_each(|chunk| chunk.bounds = frame.chunk_bounds(chunk));
    }

    /// Terrain bounds in the local frame.
    pub fn bounding_box(&self) -> crate::math::Aabb {
        self.chunks[0].bounds
    }

    pub fn world_to_local(&self, p: DVec3) -> Vec3 {
        Vec3::new(
            (p.x - self.origin.x) as f32,
            p.y as f32,
            (p.z - self.origin.y) as f32,
        )
    }

    pub fn local_to_world(&self, p: Vec3) -> DVec3 {
        DVec3::new(
            p.x as f64 + self.origin.x,
            p.y as f64,
            p.z as f64 + self.origin.y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_cell_floors() {
        assert_eq!(lattice_cell(999.0, 0.0, 1000.0), (0, 0));
        assert_eq!(lattice_cell(1001.0, 0.0, 1000.0), (1, 0));
        assert_eq!(lattice_cell(-1.0, 2500.0, 1000.0), (-1, 2));
    }

    #[test]
    fn test_chunk_bounds_tile_the_root() {
        let frame = BoundsFrame {
            tree_depth: 3,
            base_chunk_dimension: 16.0,
            vertical_scale: 0.5,
            half_size: 32.0,
            origin: DVec2::ZERO,
        };

        let mut root = ChunkRecord::new(0, 0, 0, 0);
        root.min_y = -4;
        root.max_y = 10;
        let bounds = frame.chunk_bounds(&root);
        assert_eq!(bounds.min, Vec3::new(-32.0, -2.0, -32.0));
        assert_eq!(bounds.max, Vec3::new(32.0, 5.0, 32.0));

        let leaf = ChunkRecord::new(5, 2, 3, 1);
        let bounds = frame.chunk_bounds(&leaf);
        assert_eq!(bounds.min.x, 16.0);
        assert_eq!(bounds.max.x, 32.0);
        assert_eq!(bounds.min.z, -16.0);
        assert_eq!(bounds.max.z, 0.0);
    }

    #[test]
    fn test_origin_offsets_bounds() {
        let frame = BoundsFrame {
            tree_depth: 2,
            base_chunk_dimension: 8.0,
            vertical_scale: 1.0,
            half_size: 8.0,
            origin: DVec2::new(1000.0, -500.0),
        };
        let bounds = frame.chunk_bounds(&ChunkRecord::new(0, 0, 0, 0));
        assert_eq!(bounds.center(), Vec3::new(-1000.0, 0.0, 500.0));
    }
}
