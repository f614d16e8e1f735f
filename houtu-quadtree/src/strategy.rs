//! How the globe is cut into root tiles and how a position maps to a tile.
use houtu_scene::{get_tile_cell_index, mercator, Extent, LonLat};

use crate::tile::{TileGroup, TileKind};

/// A root of the forest: its tile kind and native extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootTile {
    pub kind: TileKind,
    pub extent: Extent,
}

/// Address of the tile covering a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileXY {
    pub x: u32,
    pub y: u32,
    pub zoom: u32,
    pub group: TileGroup,
}

pub trait QuadTreeStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn roots(&self) -> Vec<RootTile>;

    /// Tile covering `lon_lat` at `zoom`.
    fn get_tile_xy(&self, lon_lat: &LonLat, zoom: u32) -> TileXY;

    /// Row and column of the `grid_size` sample grid of tile `xy` under `lon_lat`.
    fn get_lon_lat_tile_offset(&self, lon_lat: &LonLat, xy: &TileXY, grid_size: u32) -> (i64, i64);
}

fn grid_offset(coords: &LonLat, extent: &Extent, grid_size: u32) -> (i64, i64) {
    let cells = f64::from(grid_size.max(2) - 1);
    let size_w = extent.width() / cells;
    let size_h = extent.height() / cells;
    let i = i64::from(grid_size) - ((coords.lat - extent.south_west.lat) / size_h).ceil() as i64 - 1;
    let j = ((coords.lon - extent.south_west.lon) / size_w).floor() as i64;
    (i, j)
}

pub fn north_cap_extent() -> Extent {
    Extent::from_array([-180.0, mercator::MAX_LAT, 180.0, 90.0])
}

pub fn south_cap_extent() -> Extent {
    Extent::from_array([-180.0, -90.0, 180.0, mercator::MIN_LAT])
}

pub fn tile_group_by_lat(lat: f64) -> TileGroup {
    if lat > mercator::MAX_LAT {
        TileGroup::North
    } else if lat < mercator::MIN_LAT {
        TileGroup::South
    } else {
        TileGroup::Common
    }
}

/// Web mercator body with lon/lat caps over both poles.
#[derive(Debug, Default, Clone, Copy)]
pub struct EarthStrategy;

impl QuadTreeStrategy for EarthStrategy {
    fn name(&self) -> &str {
        "Earth"
    }

    fn roots(&self) -> Vec<RootTile> {
        vec![
            RootTile {
                kind: TileKind::Mercator,
                extent: Extent::new(
                    LonLat::from_degrees(-mercator::POLE, -mercator::POLE),
                    LonLat::from_degrees(mercator::POLE, mercator::POLE),
                ),
            },
            RootTile {
                kind: TileKind::PolarCap,
                extent: north_cap_extent(),
            },
            RootTile {
                kind: TileKind::PolarCap,
                extent: south_cap_extent(),
            },
        ]
    }

    fn get_tile_xy(&self, lon_lat: &LonLat, zoom: u32) -> TileXY {
        let group = tile_group_by_lat(lon_lat.lat);
        let pz = f64::from(zoom).exp2();
        let cap_height = (90.0 - mercator::MAX_LAT) / pz;
        let (x, y) = match group {
            TileGroup::North => (
                get_tile_cell_index(lon_lat.lon, 360.0 / pz, -180.0),
                get_tile_cell_index(lon_lat.lat, cap_height, 90.0),
            ),
            TileGroup::South => (
                get_tile_cell_index(lon_lat.lon, 360.0 / pz, -180.0),
                get_tile_cell_index(lon_lat.lat, cap_height, mercator::MIN_LAT),
            ),
            TileGroup::Common => {
                let merc = lon_lat.forward_mercator();
                (
                    get_tile_cell_index(merc.lon, mercator::POLE2 / pz, -mercator::POLE),
                    get_tile_cell_index(merc.lat, mercator::POLE2 / pz, mercator::POLE),
                )
            }
        };
        TileXY { x, y, zoom, group }
    }

    fn get_lon_lat_tile_offset(&self, lon_lat: &LonLat, xy: &TileXY, grid_size: u32) -> (i64, i64) {
        let (coords, extent) = if lon_lat.lat > mercator::MAX_LAT {
            (*lon_lat, north_cap_extent().tile_cell(xy.x, xy.y, xy.zoom))
        } else if lon_lat.lat < mercator::MIN_LAT {
            (*lon_lat, south_cap_extent().tile_cell(xy.x, xy.y, xy.zoom))
        } else {
            (
                lon_lat.forward_mercator(),
                mercator::get_tile_extent(xy.x, xy.y, xy.zoom),
            )
        };
        grid_offset(&coords, &extent, grid_size)
    }
}

/// One lon/lat tree over the whole globe.
#[derive(Debug, Default, Clone, Copy)]
pub struct EquiStrategy;

impl EquiStrategy {
    pub fn world() -> Extent {
        Extent::from_array([-180.0, -90.0, 180.0, 90.0])
    }
}

impl QuadTreeStrategy for EquiStrategy {
    fn name(&self) -> &str {
        "Equi"
    }

    fn roots(&self) -> Vec<RootTile> {
        vec![RootTile {
            kind: TileKind::Equirectangular,
            extent: Self::world(),
        }]
    }

    fn get_tile_xy(&self, lon_lat: &LonLat, zoom: u32) -> TileXY {
        let pz = f64::from(zoom).exp2();
        TileXY {
            x: get_tile_cell_index(lon_lat.lon, 360.0 / pz, -180.0),
            y: get_tile_cell_index(lon_lat.lat, 180.0 / pz, 90.0),
            zoom,
            group: TileGroup::Common,
        }
    }

    fn get_lon_lat_tile_offset(&self, lon_lat: &LonLat, xy: &TileXY, grid_size: u32) -> (i64, i64) {
        let extent = Self::world().tile_cell(xy.x, xy.y, xy.zoom);
        grid_offset(lon_lat, &extent, grid_size)
    }
}
