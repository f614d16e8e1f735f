//! One quadrant's renderable surface: identity, bounds and vertex buffers.
mod geometry;
mod terrain;

use std::sync::Arc;

use bevy::math::DVec3;
use houtu_jobs::JobToken;
use houtu_scene::{
    math::{log2_u32, HighLowVertices},
    mercator, BoundingSphere, Box3, Ellipsoid, Extent, LonLat, Projection, Ray, RayHit,
};

pub use geometry::*;
pub use terrain::*;

use crate::{config::TerrainConfig, quad::Side};

pub const MAX_POLE_ZOOM: u32 = 7;
pub const POLE_PIECE_SIZE: f64 = (90.0 - mercator::MAX_LAT) / (1u32 << MAX_POLE_ZOOM) as f64;

/// Region of the globe a tile belongs to. Tile indexes restart in every group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileGroup {
    Common = 0,
    North = 1,
    South = 2,
}

/// Fallback texture a renderer shows before imagery arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultTexture {
    SolidOne,
    SolidTwo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKind {
    /// Spherical mercator body between `MIN_LAT` and `MAX_LAT`, extent in meters.
    Mercator,
    /// Lon/lat cap above `MAX_LAT` or below `MIN_LAT`.
    PolarCap,
    /// Lon/lat tile of an equirectangular tree.
    Equirectangular,
}

impl TileKind {
    pub fn projection(&self) -> Projection {
        match self {
            TileKind::Mercator => Projection::Epsg3857,
            TileKind::PolarCap => Projection::Epsg4326,
            TileKind::Equirectangular => Projection::Equi,
        }
    }

    pub fn is_lon_lat(&self) -> bool {
        self.projection().is_lon_lat()
    }
}

/// Ellipsoid points of the extent corners.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TileCorners {
    pub sw: DVec3,
    pub nw: DVec3,
    pub ne: DVec3,
    pub se: DVec3,
}

/// High/low position buffers handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMesh {
    pub grid_size: u32,
    pub high: Vec<f32>,
    pub low: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub kind: TileKind,
    pub group: TileGroup,
    pub zoom: u32,
    pub x: u32,
    pub y: u32,
    pub x_east: u32,
    pub x_west: u32,
    pub y_north: i64,
    pub y_south: i64,
    /// Extent in the native projection.
    pub extent: Extent,
    pub extent_lon_lat: Extent,
    pub grid_size: u32,
    pub file_grid_size: u32,
    pub bsphere: BoundingSphere,
    pub bbox: Box3,
    pub plain_radius: f64,
    pub corners: TileCorners,
    pub center_normal: DVec3,
    pub global_texture_coordinates: [f32; 4],

    pub initialized: bool,
    pub plain_ready: bool,
    pub plain_processing: bool,
    pub terrain_ready: bool,
    pub terrain_is_loading: bool,
    pub terrain_exists: bool,
    pub pass_ready: bool,
    pub normal_map_ready: bool,
    pub ready_to_engage: bool,
    pub in_the_queue: bool,

    pub plain_vertices: Option<HighLowVertices>,
    pub plain_normals: Option<Vec<f32>>,
    /// Current surface, also the buffer edge equalization writes into.
    pub terrain_vertices: Option<HighLowVertices>,
    pub no_data: Option<Vec<u8>>,
    pub normal_map_vertices: Option<HighLowVertices>,
    pub normal_map_normals: Option<Arc<Vec<f32>>>,
    /// Normals used for lighting, possibly borrowed from an ancestor.
    pub normal_map_texture: Option<Arc<Vec<f32>>>,
    /// `(dx, dy, scale)` of this tile inside `normal_map_texture`.
    pub normal_map_bias: [f32; 3],
    pub applied_neighbors_zoom: [u32; 4],

    pub transition_opacity: f32,
    pub transition_timestamp: f64,
    pub mesh: Option<TileMesh>,

    pub plain_token: Option<JobToken>,
    pub terrain_token: Option<JobToken>,
}

impl Tile {
    pub fn new(kind: TileKind, zoom: u32, extent: Extent, terrain: &TerrainConfig) -> Self {
        let extent_lon_lat = kind.projection().unproject_extent(&extent);
        let mut tile = Tile {
            kind,
            group: TileGroup::Common,
            zoom,
            x: 0,
            y: 0,
            x_east: 0,
            x_west: 0,
            y_north: 0,
            y_south: 0,
            extent,
            extent_lon_lat,
            grid_size: terrain.grid_size_at(zoom),
            file_grid_size: 0,
            bsphere: BoundingSphere::default(),
            bbox: Box3::default(),
            plain_radius: 0.0,
            corners: TileCorners::default(),
            center_normal: DVec3::ZERO,
            global_texture_coordinates: [0.0; 4],
            initialized: false,
            plain_ready: false,
            plain_processing: false,
            terrain_ready: false,
            terrain_is_loading: false,
            terrain_exists: false,
            pass_ready: false,
            normal_map_ready: false,
            ready_to_engage: false,
            in_the_queue: false,
            plain_vertices: None,
            plain_normals: None,
            terrain_vertices: None,
            no_data: None,
            normal_map_vertices: None,
            normal_map_normals: None,
            normal_map_texture: None,
            normal_map_bias: [0.0, 0.0, 1.0],
            applied_neighbors_zoom: [0; 4],
            transition_opacity: 0.0,
            transition_timestamp: 0.0,
            mesh: None,
            plain_token: None,
            terrain_token: None,
        };
        tile.assign_tile_indexes();
        tile
    }

    pub fn projection(&self) -> Projection {
        self.kind.projection()
    }

    pub fn is_north(&self) -> bool {
        self.group == TileGroup::North
    }

    fn assign_tile_indexes(&mut self) {
        let e = self.extent;
        let width = e.width();
        let height = e.height();
        let (x, y, group) = match self.kind {
            TileKind::Mercator => (
                ((-mercator::POLE - e.south_west.lon).abs() / width).round(),
                ((mercator::POLE - e.north_east.lat).abs() / height).round(),
                TileGroup::Common,
            ),
            TileKind::PolarCap => {
                let x = ((-180.0 - e.south_west.lon).abs() / width).round();
                if e.north_east.lat > 0.0 {
                    (x, ((90.0 - e.north_east.lat) / height).round(), TileGroup::North)
                } else {
                    (
                        x,
                        ((mercator::MIN_LAT - e.north_east.lat) / height).round(),
                        TileGroup::South,
                    )
                }
            }
            TileKind::Equirectangular => (
                ((-180.0 - e.south_west.lon).abs() / width).round(),
                ((90.0 - e.north_east.lat).abs() / height).round(),
                TileGroup::Common,
            ),
        };
        let p2 = 1u64 << self.zoom;
        self.group = group;
        self.x = x as u32;
        self.y = y.max(0.0) as u32;
        self.x_east = ((u64::from(self.x) + 1) % p2) as u32;
        self.x_west = ((p2 + u64::from(self.x) - 1) % p2) as u32;
        self.y_north = i64::from(self.y) - 1;
        self.y_south = i64::from(self.y) + 1;
    }

    /// Readies the tile for geometry. Returns the log2 of its grid size.
    pub fn initialize(&mut self, terrain: &TerrainConfig) -> u32 {
        self.grid_size = terrain.grid_size_at(self.zoom);
        self.normal_map_texture = None;
        self.assign_global_texture_coordinates();
        self.initialized = true;
        log2_u32(self.grid_size)
    }

    fn assign_global_texture_coordinates(&mut self) {
        let e = self.extent;
        self.global_texture_coordinates = match self.kind {
            TileKind::Mercator => [
                ((e.south_west.lon + mercator::POLE) * mercator::ONE_BY_POLE_DOUBLE) as f32,
                ((mercator::POLE - e.north_east.lat) * mercator::ONE_BY_POLE_DOUBLE) as f32,
                ((e.north_east.lon + mercator::POLE) * mercator::ONE_BY_POLE_DOUBLE) as f32,
                ((mercator::POLE - e.south_west.lat) * mercator::ONE_BY_POLE_DOUBLE) as f32,
            ],
            TileKind::PolarCap | TileKind::Equirectangular => [
                ((e.south_west.lon + 180.0) / 360.0) as f32,
                ((90.0 - e.north_east.lat) / 180.0) as f32,
                ((e.north_east.lon + 180.0) / 360.0) as f32,
                ((90.0 - e.south_west.lat) / 180.0) as f32,
            ],
        };
    }

    pub fn default_texture(&self) -> DefaultTexture {
        match self.group {
            TileGroup::South => DefaultTexture::SolidTwo,
            _ => DefaultTexture::SolidOne,
        }
    }

    /// Deepest zoom a polar cap row may refine to.
    pub fn max_pole_zoom(&self) -> u32 {
        let lat = self.extent.north_east.lat;
        if self.is_north() {
            let yz = ((90.0 - lat) / POLE_PIECE_SIZE).floor();
            (yz / 16.0).floor() as u32 + MAX_POLE_ZOOM
        } else {
            let yz = ((mercator::MIN_LAT - lat) / POLE_PIECE_SIZE).floor();
            (12.0 - (yz / 16.0).floor()).max(0.0) as u32
        }
    }

    /// Whether the tree may refine below this tile.
    pub fn check_zoom(&self, terrain: &TerrainConfig) -> bool {
        let below_max = self.zoom < terrain.max_node_zoom();
        match self.kind {
            TileKind::PolarCap => below_max && self.zoom <= self.max_pole_zoom(),
            _ => below_max,
        }
    }

    /// Camera position expressed the way this tile's extent is.
    pub fn inside_lon_lat(&self, lon_lat: &LonLat, lon_lat_merc: &LonLat) -> LonLat {
        match self.kind {
            TileKind::Mercator => *lon_lat_merc,
            _ => *lon_lat,
        }
    }

    /// Same-zoom, same-group adjacency by tile index, anti-meridian wraps.
    pub fn get_neighbor_side(&self, b: &Tile) -> Option<Side> {
        if self.y == b.y {
            if self.x == b.x_east {
                return Some(Side::West);
            } else if self.x == b.x_west {
                return Some(Side::East);
            }
        } else if self.x == b.x {
            if i64::from(self.y) == b.y_south {
                return Some(Side::North);
            } else if i64::from(self.y) == b.y_north {
                return Some(Side::South);
            }
        }
        None
    }

    pub fn set_bounding_volume_box(&mut self, bbox: Box3) {
        self.bbox = bbox;
        self.bsphere = BoundingSphere::from_corners(bbox.min, bbox.max);
    }

    pub fn set_bounding_volume_3v(&mut self, min: DVec3, max: DVec3) {
        self.set_bounding_volume_box(Box3::new(min, max));
    }

    /// Bounds of the extent on the bare ellipsoid. A sample grid is boxed
    /// and padded by the largest gap between a cell's surface center and the
    /// bilinear center of its corners, so the box holds the curved patch.
    pub fn create_bounds_by_extent(&mut self, ellipsoid: &Ellipsoid) {
        let e = self.extent_lon_lat;
        let (sw, ne) = (e.south_west, e.north_east);
        self.corners = TileCorners {
            sw: ellipsoid.geodetic_to_cartesian(sw.lon, sw.lat, 0.0),
            nw: ellipsoid.geodetic_to_cartesian(sw.lon, ne.lat, 0.0),
            ne: ellipsoid.geodetic_to_cartesian(ne.lon, ne.lat, 0.0),
            se: ellipsoid.geodetic_to_cartesian(ne.lon, sw.lat, 0.0),
        };
        self.center_normal = ellipsoid.geodetic_surface_normal_lon_lat(&e.center());

        if self.zoom == 0 {
            let r = ellipsoid.equatorial_size();
            self.bbox = Box3::new(-ellipsoid.radii, ellipsoid.radii);
            self.bsphere = BoundingSphere::new(DVec3::ZERO, r);
            return;
        }

        const SAMPLES: usize = 9;
        let cells = (SAMPLES - 1) as f64;
        let step_lon = e.width() / cells;
        let step_lat = e.height() / cells;
        let point = |i: f64, j: f64| {
            ellipsoid.geodetic_to_cartesian(sw.lon + j * step_lon, ne.lat - i * step_lat, 0.0)
        };

        let mut points = [[DVec3::ZERO; SAMPLES]; SAMPLES];
        let mut bbox = Box3::empty();
        for (i, row) in points.iter_mut().enumerate() {
            for (j, p) in row.iter_mut().enumerate() {
                *p = point(i as f64, j as f64);
                bbox.expand_point(*p);
            }
        }

        let mut pad: f64 = 0.0;
        for i in 0..SAMPLES - 1 {
            for j in 0..SAMPLES - 1 {
                let bilinear =
                    (points[i][j] + points[i][j + 1] + points[i + 1][j] + points[i + 1][j + 1]) * 0.25;
                let surface = point(i as f64 + 0.5, j as f64 + 0.5);
                pad = pad.max(surface.distance(bilinear));
            }
        }
        let pad = DVec3::splat(pad * 1.5);
        self.set_bounding_volume_box(Box3::new(bbox.min - pad, bbox.max + pad));
    }

    /// Distance from `xyz` down to this tile's surface and the ground point.
    /// Negative when `xyz` is below the surface.
    pub fn get_terrain_point(
        &self,
        ellipsoid: &Ellipsoid,
        xyz: DVec3,
        inside: &LonLat,
    ) -> Option<(f64, DVec3)> {
        let norm = ellipsoid.geodetic_surface_normal(xyz)?;
        let ray = Ray::new(xyz, -norm);
        let verts = match self.terrain_vertices.as_ref() {
            Some(v) if !v.is_empty() => v,
            _ => {
                let hit = ellipsoid.hit_ray(ray.origin, ray.direction)?;
                return Some((xyz.distance(hit), hit));
            }
        };

        let size = f64::from(verts.grid_size());
        let e = self.extent;
        let qx = e.width() / size;
        let qy = e.height() / size;
        let xn = inside.lon - e.south_west.lon;
        let yn = inside.lat - e.south_west.lat;
        let ind_x = (xn / qx).floor().clamp(0.0, size - 1.0) as usize;
        let ind_y = (size - yn / qy).floor().clamp(0.0, size - 1.0) as usize;
        let row = size as usize + 1;

        let v0 = verts.get(row * ind_y + ind_x)?;
        let v1 = verts.get(row * ind_y + ind_x + 1)?;
        let v2 = verts.get(row * (ind_y + 1) + ind_x)?;
        let v3 = verts.get(row * (ind_y + 1) + ind_x + 1)?;
        let reverse = Ray::new(xyz, norm);

        let mut last = RayHit::Outside;
        for (a, b, c) in [(v0, v1, v2), (v1, v3, v2)] {
            last = ray.hit_triangle(a, b, c);
            match last {
                RayHit::Inside(p) => return Some((xyz.distance(p), p)),
                RayHit::Away(_) => {
                    if let RayHit::Inside(p) = reverse.hit_triangle(a, b, c) {
                        return Some((-xyz.distance(p), p));
                    }
                }
                _ => {}
            }
        }
        match last {
            RayHit::Away(p) => Some((-xyz.distance(p), p)),
            RayHit::Inside(p) | RayHit::InPlane(p) => Some((xyz.distance(p), p)),
            RayHit::Outside => {
                let hit = ellipsoid.hit_ray(ray.origin, ray.direction)?;
                Some((xyz.distance(hit), hit))
            }
        }
    }

    /// Copies the current surface into the renderer-facing mesh.
    pub fn engage(&mut self) {
        self.ready_to_engage = false;
        if let Some(v) = self.terrain_vertices.as_ref() {
            self.mesh = Some(TileMesh {
                grid_size: self.grid_size,
                high: v.high.clone(),
                low: v.low.clone(),
            });
        }
    }

    /// Ramps the opacity towards 1 by the time passed since the transition began.
    pub fn increase_transition_opacity(&mut self, now_ms: f64, duration_ms: f64) {
        let ramp = if duration_ms > 0.0 {
            ((now_ms - self.transition_timestamp) / duration_ms) as f32
        } else {
            1.0
        };
        self.transition_opacity = self.transition_opacity.max(ramp).min(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merc_tile(x: u32, y: u32, z: u32) -> Tile {
        Tile::new(
            TileKind::Mercator,
            z,
            mercator::get_tile_extent(x, y, z),
            &TerrainConfig::empty(),
        )
    }

    #[test]
    fn mercator_indexes() {
        let t = merc_tile(3, 5, 3);
        assert_eq!((t.x, t.y, t.group), (3, 5, TileGroup::Common));
        assert_eq!(t.x_east, 4);
        assert_eq!(t.x_west, 2);
        assert_eq!((t.y_north, t.y_south), (4, 6));

        let edge = merc_tile(7, 0, 3);
        assert_eq!(edge.x_east, 0);
        let edge = merc_tile(0, 0, 3);
        assert_eq!(edge.x_west, 7);
        assert_eq!(edge.y_north, -1);
    }

    #[test]
    fn polar_groups_and_texture() {
        let terrain = TerrainConfig::empty();
        let north = Tile::new(
            TileKind::PolarCap,
            0,
            Extent::from_array([-180.0, mercator::MAX_LAT, 180.0, 90.0]),
            &terrain,
        );
        assert_eq!(north.group, TileGroup::North);
        assert_eq!(north.default_texture(), DefaultTexture::SolidOne);
        assert_eq!(north.extent_lon_lat, north.extent);

        let south = Tile::new(
            TileKind::PolarCap,
            0,
            Extent::from_array([-180.0, -90.0, 180.0, mercator::MIN_LAT]),
            &terrain,
        );
        assert_eq!(south.group, TileGroup::South);
        assert_eq!(south.default_texture(), DefaultTexture::SolidTwo);
        assert_eq!(south.y, 0);
    }

    #[test]
    fn neighbor_side_wraps() {
        let a = merc_tile(0, 2, 2);
        let b = merc_tile(3, 2, 2);
        assert_eq!(a.get_neighbor_side(&b), Some(Side::West));
        assert_eq!(b.get_neighbor_side(&a), Some(Side::East));
        let c = merc_tile(0, 3, 2);
        assert_eq!(a.get_neighbor_side(&c), Some(Side::South));
        assert_eq!(c.get_neighbor_side(&a), Some(Side::North));
        assert_eq!(b.get_neighbor_side(&c), None);
    }

    #[test]
    fn texture_coordinates_cover_world() {
        let mut t = merc_tile(0, 0, 0);
        t.initialize(&TerrainConfig::empty());
        assert_eq!(t.global_texture_coordinates, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn extent_bounds_hold_the_patch() {
        let ellipsoid = Ellipsoid::wgs84();
        let mut t = merc_tile(1, 1, 2);
        t.create_bounds_by_extent(&ellipsoid);
        let e = t.extent_lon_lat;
        for i in 0..=16 {
            for j in 0..=16 {
                let lon = e.south_west.lon + e.width() * j as f64 / 16.0;
                let lat = e.south_west.lat + e.height() * i as f64 / 16.0;
                let p = ellipsoid.geodetic_to_cartesian(lon, lat, 0.0);
                assert!(t.bbox.contains_point(p));
                assert!(p.distance(t.bsphere.center) <= t.bsphere.radius + 1e-6);
            }
        }
    }

    #[test]
    fn terrain_point_falls_back_to_ellipsoid() {
        let ellipsoid = Ellipsoid::wgs84();
        let t = merc_tile(0, 0, 0);
        let xyz = ellipsoid.geodetic_to_cartesian(10.0, 10.0, 500.0);
        let (d, _) = t
            .get_terrain_point(&ellipsoid, xyz, &LonLat::new(10.0, 10.0, 0.0))
            .unwrap();
        assert!((d - 500.0).abs() < 1.0);
    }

    #[test]
    fn polar_zoom_ceiling() {
        let terrain = TerrainConfig::empty();
        let north = Tile::new(
            TileKind::PolarCap,
            3,
            Extent::from_array([-180.0, 89.5, -135.0, 90.0]),
            &terrain,
        );
        assert_eq!(north.max_pole_zoom(), 7);
        assert!(north.check_zoom(&terrain));
        let deep = Tile { zoom: 8, ..north };
        assert!(!deep.check_zoom(&terrain));
    }
}
