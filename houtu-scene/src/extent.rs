use serde::{Deserialize, Serialize};

use crate::LonLat;

/// Axis aligned geographic rectangle. Depending on the owner it holds degrees
/// or mercator meters; `lon` is always the horizontal axis.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub south_west: LonLat,
    pub north_east: LonLat,
}

impl Extent {
    pub fn new(south_west: LonLat, north_east: LonLat) -> Self {
        Extent {
            south_west,
            north_east,
        }
    }

    /// `[west, south, east, north]`.
    pub fn from_array(arr: [f64; 4]) -> Self {
        Extent::new(
            LonLat::from_degrees(arr[0], arr[1]),
            LonLat::from_degrees(arr[2], arr[3]),
        )
    }

    /// An inverted extent, ready to be grown with [`Extent::expand`].
    pub fn empty_lon_lat() -> Self {
        Extent::new(
            LonLat::from_degrees(180.0, 180.0),
            LonLat::from_degrees(-180.0, -180.0),
        )
    }

    pub fn width(&self) -> f64 {
        self.north_east.lon - self.south_west.lon
    }

    pub fn height(&self) -> f64 {
        self.north_east.lat - self.south_west.lat
    }

    pub fn center(&self) -> LonLat {
        LonLat::from_degrees(
            self.south_west.lon + self.width() * 0.5,
            self.south_west.lat + self.height() * 0.5,
        )
    }

    pub fn north_west(&self) -> LonLat {
        LonLat::from_degrees(self.south_west.lon, self.north_east.lat)
    }

    pub fn south_east(&self) -> LonLat {
        LonLat::from_degrees(self.north_east.lon, self.south_west.lat)
    }

    /// Border inclusive.
    pub fn is_inside(&self, p: &LonLat) -> bool {
        p.lon >= self.south_west.lon
            && p.lon <= self.north_east.lon
            && p.lat >= self.south_west.lat
            && p.lat <= self.north_east.lat
    }

    pub fn overlaps(&self, other: &Extent) -> bool {
        self.south_west.lon <= other.north_east.lon
            && self.north_east.lon >= other.south_west.lon
            && self.south_west.lat <= other.north_east.lat
            && self.north_east.lat >= other.south_west.lat
    }

    pub fn is_empty(&self) -> bool {
        self.width() < 0.0 || self.height() < 0.0
    }

    /// Grows the extent to cover `other`.
    pub fn expand(&mut self, other: &Extent) {
        if other.south_west.lon < self.south_west.lon {
            self.south_west.lon = other.south_west.lon;
        }
        if other.north_east.lon > self.north_east.lon {
            self.north_east.lon = other.north_east.lon;
        }
        if other.south_west.lat < self.south_west.lat {
            self.south_west.lat = other.south_west.lat;
        }
        if other.north_east.lat > self.north_east.lat {
            self.north_east.lat = other.north_east.lat;
        }
    }

    pub fn inverse_mercator(&self) -> Extent {
        Extent::new(
            self.south_west.inverse_mercator(),
            self.north_east.inverse_mercator(),
        )
    }

    pub fn forward_mercator(&self) -> Extent {
        Extent::new(
            self.south_west.forward_mercator(),
            self.north_east.forward_mercator(),
        )
    }

    /// Extent of the cell `x`, `y` when this extent is cut in `2^z` columns
    /// and rows, rows counted from the north.
    pub fn tile_cell(&self, x: u32, y: u32, z: u32) -> Extent {
        let p = f64::from(z).exp2();
        let w = self.width() / p;
        let h = self.height() / p;
        let west = self.south_west.lon + f64::from(x) * w;
        let north = self.north_east.lat - f64::from(y) * h;
        Extent::new(
            LonLat::from_degrees(west, north - h),
            LonLat::from_degrees(west + w, north),
        )
    }
}

/// Index of the cell of `size` containing `coordinate`, counted away from `world_edge`.
pub fn get_tile_cell_index(coordinate: f64, size: f64, world_edge: f64) -> u32 {
    ((coordinate - world_edge).abs() / size).floor() as u32
}
