use bevy::math::{DVec3, DVec4};

/// Plane in Hessian normal form, `normal · p + distance = 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Self {
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    pub fn from_vec4(v: DVec4) -> Self {
        Self {
            normal: v.truncate(),
            distance: v.w,
        }
    }

    /// Signed distance, positive on the side the normal points to.
    pub fn get_point_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }

    pub fn project_point(&self, point: DVec3) -> DVec3 {
        point - self.normal * self.get_point_distance(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_distance() {
        let plane = Plane::from_point_normal(DVec3::new(0.0, 0.0, 5.0), DVec3::Z);
        assert_eq!(plane.get_point_distance(DVec3::new(3.0, 1.0, 8.0)), 3.0);
        assert_eq!(plane.get_point_distance(DVec3::ZERO), -5.0);
        assert_eq!(plane.project_point(DVec3::new(1.0, 2.0, 0.0)), DVec3::new(1.0, 2.0, 5.0));
    }
}
