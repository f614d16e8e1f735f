use bevy::math::DVec3;

use crate::{BoundingSphere, Box3, Plane};

/// Six inward facing planes of a perspective sub-frustum.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CullingVolume {
    pub planes: [Plane; 6],
}

impl CullingVolume {
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// `fovy` in radians, `aspect` is width over height.
    pub fn from_perspective(
        position: DVec3,
        direction: DVec3,
        up: DVec3,
        fovy: f64,
        aspect: f64,
        near: f64,
        far: f64,
    ) -> Self {
        let t = near * (fovy * 0.5).tan();
        let b = -t;
        let r = aspect * t;
        let l = -r;

        let right = direction.cross(up);
        let near_center = position + direction * near;
        let far_center = position + direction * far;

        let mut planes = [Plane::default(); 6];

        let normal = (near_center + right * l - position)
            .normalize()
            .cross(up)
            .normalize();
        planes[0] = Plane::from_point_normal(position, normal);

        let normal = up.cross(near_center + right * r - position).normalize();
        planes[1] = Plane::from_point_normal(position, normal);

        let normal = right.cross(near_center + up * b - position).normalize();
        planes[2] = Plane::from_point_normal(position, normal);

        let normal = (near_center + up * t - position).cross(right).normalize();
        planes[3] = Plane::from_point_normal(position, normal);

        planes[4] = Plane::from_point_normal(near_center, direction);
        planes[5] = Plane::from_point_normal(far_center, -direction);

        Self { planes }
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.get_point_distance(point) > 0.0)
    }

    /// False only when the sphere is completely behind one plane.
    pub fn contains_sphere(&self, sphere: &BoundingSphere) -> bool {
        !self
            .planes
            .iter()
            .any(|plane| plane.get_point_distance(sphere.center) <= -sphere.radius)
    }

    /// False only when all eight corners are behind the same plane.
    pub fn contains_box(&self, bbox: &Box3) -> bool {
        let corners = bbox.corners();
        !self.planes.iter().any(|plane| {
            corners
                .iter()
                .all(|corner| plane.get_point_distance(*corner) < 0.0)
        })
    }
}
