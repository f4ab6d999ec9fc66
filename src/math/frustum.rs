//! View frustum for chunk culling

use crate::core::types::{Vec3, Vec4, Mat4};
use super::aabb::Aabb;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Box corner furthest along the normal
    fn p_vertex(&self, aabb: &Aabb) -> Vec3 {
        Vec3::select(self.normal.cmpge(Vec3::ZERO), aabb.max, aabb.min)
    }

    /// Box corner furthest against the normal
    fn n_vertex(&self, aabb: &Aabb) -> Vec3 {
        Vec3::select(self.normal.cmpge(Vec3::ZERO), aabb.min, aabb.max)
    }
}

/// Outcome of testing a box against the frustum.
///
/// `active_planes` is a bitmask of planes the box straddles; children of a box
/// only need testing against those planes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CullResult {
    pub culled: bool,
    pub active_planes: u8,
}

impl CullResult {
    /// Starting state: not culled, all six planes still to test.
    pub const ALL_PLANES: CullResult = CullResult { culled: false, active_planes: 0b11_1111 };

    /// Fully inside: no plane needs testing below this point.
    pub fn is_fully_inside(&self) -> bool {
        !self.culled && self.active_planes == 0
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from view-projection matrix
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let left = Self::normalize_plane(rows[3] + rows[0]);
        let right = Self::normalize_plane(rows[3] - rows[0]);
        let bottom = Self::normalize_plane(rows[3] + rows[1]);
        let top = Self::normalize_plane(rows[3] - rows[1]);
        // Depth range is [0, 1]: near plane is row2 alone
        let near = Self::normalize_plane(rows[2]);
        let far = Self::normalize_plane(rows[3] - rows[2]);

        Self {
            planes: [near, far, left, right, top, bottom],
        }
    }

    fn normalize_plane(plane: Vec4) -> Plane {
        let normal = plane.truncate();
        let len = normal.length();
        Plane {
            normal: normal / len,
            distance: plane.w / len,
        }
    }

    /// Check if point is inside frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Classify a box, testing only the planes still active in `parent`.
    pub fn classify_aabb(&self, aabb: &Aabb, parent: CullResult) -> CullResult {
        if parent.culled {
            return parent;
        }

        let mut active = parent.active_planes;
        for (i, plane) in self.planes.iter().enumerate() {
            let bit = 1u8 << i;
            if active & bit == 0 {
                continue;
            }
            if plane.distance_to_point(plane.p_vertex(aabb)) < 0.0 {
                return CullResult { culled: true, active_planes: 0 };
            }
            if plane.distance_to_point(plane.n_vertex(aabb)) >= 0.0 {
                // Entirely in front of this plane; descendants can skip it
                active &= !bit;
            }
        }

        CullResult { culled: false, active_planes: active }
    }
}
