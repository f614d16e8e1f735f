use serde::{Deserialize, Serialize};

use crate::{Extent, LonLat};

/// Native coordinate system of a tile extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Projection {
    /// Spherical mercator meters.
    Epsg3857,
    /// Plain degrees.
    Epsg4326,
    /// Degrees laid out as an equirectangular plane.
    Equi,
}

impl Projection {
    pub fn id(&self) -> &'static str {
        match self {
            Projection::Epsg3857 => "EPSG:3857",
            Projection::Epsg4326 => "EPSG:4326",
            Projection::Equi => "equi",
        }
    }

    pub fn is_lon_lat(&self) -> bool {
        !matches!(self, Projection::Epsg3857)
    }

    /// Native coordinates to degrees.
    pub fn unproject(&self, native: &LonLat) -> LonLat {
        match self {
            Projection::Epsg3857 => native.inverse_mercator(),
            _ => *native,
        }
    }

    /// Degrees to native coordinates.
    pub fn project(&self, lon_lat: &LonLat) -> LonLat {
        match self {
            Projection::Epsg3857 => lon_lat.forward_mercator(),
            _ => *lon_lat,
        }
    }

    pub fn unproject_extent(&self, native: &Extent) -> Extent {
        match self {
            Projection::Epsg3857 => native.inverse_mercator(),
            _ => *native,
        }
    }
}
