use bevy::math::DVec3;

use crate::{math, LonLat};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    pub radii: DVec3,
    pub radii_squared: DVec3,
    pub one_over_radii_squared: DVec3,
    pub minimum_radius: f64,
    pub maximum_radius: f64,
    /// First eccentricity squared, `(a² - b²) / a²`.
    pub e2: f64,
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Ellipsoid::wgs84()
    }
}

impl Ellipsoid {
    pub fn wgs84() -> Self {
        Ellipsoid::new(6378137.0, 6378137.0, 6356752.3142451793)
    }

    pub fn unit_sphere() -> Self {
        Ellipsoid::new(1.0, 1.0, 1.0)
    }

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Ellipsoid {
            radii: DVec3::new(x, y, z),
            radii_squared: DVec3::new(x * x, y * y, z * z),
            one_over_radii_squared: DVec3::new(1.0 / (x * x), 1.0 / (y * y), 1.0 / (z * z)),
            minimum_radius: x.min(y).min(z),
            maximum_radius: x.max(y).max(z),
            e2: (x * x - z * z) / (x * x),
        }
    }

    pub fn from_vec3(radii: DVec3) -> Self {
        Ellipsoid::new(radii.x, radii.y, radii.z)
    }

    pub fn equatorial_size(&self) -> f64 {
        self.radii.x
    }

    pub fn polar_size(&self) -> f64 {
        self.radii.z
    }

    pub fn polar_size_sqr(&self) -> f64 {
        self.radii_squared.z
    }

    pub fn geocentric_surface_normal(v: DVec3) -> DVec3 {
        v.normalize()
    }

    pub fn geodetic_surface_normal(&self, v: DVec3) -> Option<DVec3> {
        if v.abs_diff_eq(DVec3::ZERO, math::EPSILON14) {
            return None;
        }
        Some((v * self.one_over_radii_squared).normalize())
    }

    pub fn geodetic_surface_normal_lon_lat(&self, lon_lat: &LonLat) -> DVec3 {
        let longitude = lon_lat.lon.to_radians();
        let latitude = lon_lat.lat.to_radians();
        let cos_latitude = latitude.cos();
        DVec3::new(
            cos_latitude * longitude.cos(),
            cos_latitude * longitude.sin(),
            latitude.sin(),
        )
    }

    /// Degrees plus height to earth-centered cartesian.
    pub fn lon_lat_to_cartesian(&self, lon_lat: &LonLat) -> DVec3 {
        self.geodetic_to_cartesian(lon_lat.lon, lon_lat.lat, lon_lat.height)
    }

    pub fn geodetic_to_cartesian(&self, lon: f64, lat: f64, height: f64) -> DVec3 {
        let longitude = lon.to_radians();
        let latitude = lat.to_radians();
        let sin_lat = latitude.sin();
        let cos_lat = latitude.cos();
        let n = self.radii.x / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
        DVec3::new(
            (n + height) * cos_lat * longitude.cos(),
            (n + height) * cos_lat * longitude.sin(),
            (n * (1.0 - self.e2) + height) * sin_lat,
        )
    }

    pub fn cartesian_to_lon_lat(&self, v: DVec3) -> LonLat {
        let p = (v.x * v.x + v.y * v.y).sqrt();
        let lon = v.y.atan2(v.x).to_degrees();
        if p < math::EPSILON10 {
            let lat = if v.z >= 0.0 { 90.0 } else { -90.0 };
            return LonLat::new(lon, lat, v.z.abs() - self.polar_size());
        }
        let a = self.radii.x;
        let mut lat = v.z.atan2(p * (1.0 - self.e2));
        let mut height = 0.0;
        for _ in 0..6 {
            let sin_lat = lat.sin();
            let n = a / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
            height = p / lat.cos() - n;
            lat = v.z.atan2(p * (1.0 - self.e2 * n / (n + height)));
        }
        LonLat::new(lon, lat.to_degrees(), height)
    }

    /// Nearest intersection of a ray with the ellipsoid surface.
    pub fn hit_ray(&self, origin: DVec3, direction: DVec3) -> Option<DVec3> {
        let o = origin / self.radii;
        let d = direction / self.radii;
        let a = d.length_squared();
        let b = 2.0 * o.dot(d);
        let c = o.length_squared() - 1.0;
        let discriminant = b * b - 4.0 * a * c;
        if a == 0.0 || discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let t0 = (-b - root) / (2.0 * a);
        let t1 = (-b + root) / (2.0 * a);
        let t = if t0 >= 0.0 {
            t0
        } else if t1 >= 0.0 {
            t1
        } else {
            return None;
        };
        Some(origin + direction * t)
    }
}
