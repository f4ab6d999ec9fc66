//! Axis-aligned bounding box

use crate::core::types::Vec3;

/// Axis-aligned box given by its min and max corners. Chunk boxes span the
/// chunk's footprint in x/z and its height range in y.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn half_extent(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Check if the vertical column through (x, z) passes through the box.
    /// Edges are inclusive, so a point on a shared edge hits both chunks.
    pub fn contains_xz(&self, x: f32, z: f32) -> bool {
        x >= self.min.x && x <= self.max.x &&
        z >= self.min.z && z <= self.max.z
    }

    /// Euclidean distance from a point to the nearest point of the box.
    /// Zero when the point is inside.
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        let outside = (self.min - p).max(p - self.max).max(Vec3::ZERO);
        outside.length()
    }

    /// Footprint quadrant in child order (bit 0 = +x, bit 1 = +z), keeping
    /// this box's height range.
    pub fn quadrant(&self, index: usize) -> Aabb {
        let center = self.center();
        let (x0, x1) = if index & 1 == 0 { (self.min.x, center.x) } else { (center.x, self.max.x) };
        let (z0, z1) = if index & 2 == 0 { (self.min.z, center.z) } else { (center.z, self.max.z) };
        Aabb::new(Vec3::new(x0, self.min.y, z0), Vec3::new(x1, self.max.y, z1))
    }
}
