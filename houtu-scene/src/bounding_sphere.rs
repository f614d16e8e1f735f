use bevy::math::DVec3;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Sphere centered at `center` reaching through `point`.
    pub fn from_center_point(center: DVec3, point: DVec3) -> Self {
        Self {
            center,
            radius: center.distance(point),
        }
    }

    /// Sphere circumscribing the box `min`..`max`.
    pub fn from_corners(min: DVec3, max: DVec3) -> Self {
        let center = min + (max - min) * 0.5;
        Self {
            center,
            radius: center.distance(min),
        }
    }

    pub fn contains_sphere(&self, other: &BoundingSphere) -> bool {
        self.center.distance(other.center) + other.radius <= self.radius * (1.0 + f64::EPSILON * 16.0)
    }
}
