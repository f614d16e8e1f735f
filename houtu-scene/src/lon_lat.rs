use serde::{Deserialize, Serialize};

use crate::mercator;

/// Geographic coordinates in degrees, height in meters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub height: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64, height: f64) -> Self {
        LonLat { lon, lat, height }
    }

    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        LonLat::new(lon, lat, 0.0)
    }

    /// Degrees to spherical mercator meters, the height is kept.
    pub fn forward_mercator(&self) -> LonLat {
        let (x, y) = mercator::forward(self.lon, self.lat);
        LonLat::new(x, y, self.height)
    }

    /// Same as [`LonLat::forward_mercator`] with the latitude pulled off the poles first.
    pub fn forward_mercator_eps01(&self) -> LonLat {
        let lat = self.lat.clamp(-89.9, 89.9);
        let (x, y) = mercator::forward(self.lon, lat);
        LonLat::new(x, y, self.height)
    }

    /// Spherical mercator meters back to degrees.
    pub fn inverse_mercator(&self) -> LonLat {
        let (lon, lat) = mercator::inverse(self.lon, self.lat);
        LonLat::new(lon, lat, self.height)
    }
}
