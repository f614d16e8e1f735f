use bevy::math::DVec3;

use crate::math::EPSILON10;

/// Result of [`Ray::hit_triangle`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayHit {
    /// Hit point lies inside the triangle.
    Inside(DVec3),
    /// The ray lies in the triangle plane.
    InPlane(DVec3),
    /// Plane is hit behind the origin.
    Away(DVec3),
    /// Parallel ray, or plane hit outside the triangle.
    Outside,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }

    pub fn get_point(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    pub fn hit_triangle(&self, v0: DVec3, v1: DVec3, v2: DVec3) -> RayHit {
        let u = v1 - v0;
        let v = v2 - v0;
        let n = u.cross(v);

        let w0 = self.origin - v0;
        let a = -n.dot(w0);
        let b = n.dot(self.direction);

        if b.abs() < EPSILON10 {
            if a == 0.0 {
                return RayHit::InPlane(self.origin);
            }
            return RayHit::Outside;
        }

        let r = a / b;
        let res = self.get_point(r);
        if r < 0.0 {
            return RayHit::Away(res);
        }

        let uu = u.dot(u);
        let uv = u.dot(v);
        let vv = v.dot(v);
        let w = res - v0;
        let wu = w.dot(u);
        let wv = w.dot(v);
        let d = uv * uv - uu * vv;

        let s = (uv * wv - vv * wu) / d;
        if !(0.0..=1.0).contains(&s) {
            return RayHit::Outside;
        }
        let t = (uv * wu - uu * wv) / d;
        if t < 0.0 || s + t > 1.0 {
            return RayHit::Outside;
        }
        RayHit::Inside(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> (DVec3, DVec3, DVec3) {
        (
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(10.0, 0.0, 0.0),
            DVec3::new(0.0, 10.0, 0.0),
        )
    }

    #[test]
    fn downward_ray_hits_inside() {
        let (a, b, c) = triangle();
        let ray = Ray::new(DVec3::new(2.0, 2.0, 5.0), DVec3::new(0.0, 0.0, -1.0));
        assert_eq!(ray.hit_triangle(a, b, c), RayHit::Inside(DVec3::new(2.0, 2.0, 0.0)));
    }

    #[test]
    fn misses_and_away() {
        let (a, b, c) = triangle();
        let ray = Ray::new(DVec3::new(8.0, 8.0, 5.0), DVec3::new(0.0, 0.0, -1.0));
        assert_eq!(ray.hit_triangle(a, b, c), RayHit::Outside);
        let ray = Ray::new(DVec3::new(2.0, 2.0, 5.0), DVec3::new(0.0, 0.0, 1.0));
        assert!(matches!(ray.hit_triangle(a, b, c), RayHit::Away(_)));
        let ray = Ray::new(DVec3::new(2.0, 2.0, 5.0), DVec3::X);
        assert_eq!(ray.hit_triangle(a, b, c), RayHit::Outside);
    }
}
