//! Spherical (web) mercator in meters, `EPSG:3857`.
use std::f64::consts::{FRAC_PI_2, PI};

use crate::{Extent, LonLat};

pub const POLE: f64 = 20037508.34;
pub const POLE2: f64 = POLE * 2.0;
pub const ONE_BY_POLE_DOUBLE: f64 = 1.0 / POLE2;
pub const MAX_LAT: f64 = 85.0511287798066;
pub const MIN_LAT: f64 = -MAX_LAT;

pub fn mercator_angle_to_geodetic_latitude(mercator_angle: f64) -> f64 {
    return FRAC_PI_2 - 2.0 * (-mercator_angle).exp().atan();
}

pub fn geodetic_latitude_to_mercator_angle(latitude: f64) -> f64 {
    let sin_latitude = latitude.sin();
    return 0.5 * ((1.0 + sin_latitude) / (1.0 - sin_latitude)).ln();
}

/// Degrees to meters.
pub fn forward(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon * POLE / 180.0;
    let y = geodetic_latitude_to_mercator_angle(lat.to_radians()) * POLE / PI;
    (x, y)
}

/// Meters to degrees.
pub fn inverse(x: f64, y: f64) -> (f64, f64) {
    let lon = 180.0 * x / POLE;
    let lat = mercator_angle_to_geodetic_latitude(y * PI / POLE).to_degrees();
    (lon, lat)
}

pub fn get_tile_x(lon: f64, zoom: u32) -> u32 {
    let (x, _) = forward(lon, 0.0);
    let size = POLE2 / f64::from(zoom).exp2();
    ((POLE + x) / size).floor().max(0.0) as u32
}

pub fn get_tile_y(lat: f64, zoom: u32) -> u32 {
    let (_, y) = forward(0.0, lat.clamp(MIN_LAT, MAX_LAT));
    let size = POLE2 / f64::from(zoom).exp2();
    ((POLE - y) / size).floor().max(0.0) as u32
}

/// Mercator extent of the tile `x`, `y` at `zoom`, rows counted from the north.
pub fn get_tile_extent(x: u32, y: u32, zoom: u32) -> Extent {
    let size = POLE2 / f64::from(zoom).exp2();
    let west = -POLE + f64::from(x) * size;
    let north = POLE - f64::from(y) * size;
    Extent::new(
        LonLat::new(west, north - size, 0.0),
        LonLat::new(west + size, north, 0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_lat_maps_to_pole() {
        let (_, y) = forward(0.0, MAX_LAT);
        assert!((y - POLE).abs() < 1e-2);
        let (_, lat) = inverse(0.0, POLE);
        assert!((lat - MAX_LAT).abs() < 1e-7);
    }

    #[test]
    fn date_line() {
        let (x, _) = forward(180.0, 0.0);
        assert_eq!(x, POLE);
        let (x, _) = forward(-180.0, 0.0);
        assert_eq!(x, -POLE);
    }

    #[test]
    fn tile_indices() {
        assert_eq!(get_tile_x(-179.9, 1), 0);
        assert_eq!(get_tile_x(0.1, 1), 1);
        assert_eq!(get_tile_y(45.0, 1), 0);
        assert_eq!(get_tile_y(-45.0, 1), 1);
    }

    #[test]
    fn deep_zoom_tiles() {
        let e = get_tile_extent(0, 0, 40);
        assert!(e.width() > 0.0 && e.width() < 1e-4);
        assert_eq!(get_tile_x(0.0, 32), 1u32 << 31);
        assert_eq!(get_tile_y(0.0, 32), 1u32 << 31);
    }

    #[test]
    fn tile_extent() {
        let e = get_tile_extent(1, 0, 1);
        assert_eq!(e.south_west.lon, 0.0);
        assert_eq!(e.south_west.lat, 0.0);
        assert_eq!(e.north_east.lon, POLE);
        assert_eq!(e.north_east.lat, POLE);
    }
}
