use bevy::math::DVec3;

/// Axis aligned box in earth-centered coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box3 {
    pub min: DVec3,
    pub max: DVec3,
}

impl Default for Box3 {
    fn default() -> Self {
        Box3 {
            min: DVec3::ZERO,
            max: DVec3::ZERO,
        }
    }
}

impl Box3 {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Box3 { min, max }
    }

    /// Inverted box that any point grows.
    pub fn empty() -> Self {
        Box3 {
            min: DVec3::splat(f64::MAX),
            max: DVec3::splat(f64::MIN),
        }
    }

    /// `[xmin, ymin, zmin, xmax, ymax, zmax]`.
    pub fn from_bounds_arr(bounds: [f64; 6]) -> Self {
        Box3 {
            min: DVec3::new(bounds[0], bounds[1], bounds[2]),
            max: DVec3::new(bounds[3], bounds[4], bounds[5]),
        }
    }

    pub fn from_points(points: &[DVec3]) -> Self {
        let mut b = Box3::empty();
        for p in points {
            b.expand_point(*p);
        }
        b
    }

    pub fn expand_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> DVec3 {
        self.min + (self.max - self.min) * 0.5
    }

    pub fn corners(&self) -> [DVec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            DVec3::new(a.x, a.y, a.z),
            DVec3::new(b.x, a.y, a.z),
            DVec3::new(a.x, b.y, a.z),
            DVec3::new(b.x, b.y, a.z),
            DVec3::new(a.x, a.y, b.z),
            DVec3::new(b.x, a.y, b.z),
            DVec3::new(a.x, b.y, b.z),
            DVec3::new(b.x, b.y, b.z),
        ]
    }

    pub fn contains_point(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}
