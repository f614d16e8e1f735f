use bevy::{math::DVec3, prelude::Resource};
use houtu_scene::{CullingVolume, Ellipsoid, LonLat};
use serde::{Deserialize, Serialize};

/// Lens and viewport of a [`PlanetCamera`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraView {
    pub fov_y_degrees: f64,
    pub width: f64,
    pub height: f64,
    /// `(near, far)` of every sub-frustum, nearest first.
    pub frustums: Vec<(f64, f64)>,
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            fov_y_degrees: 45.0,
            width: 1920.0,
            height: 1080.0,
            frustums: vec![
                (1.0, 100.0 + 0.075),
                (100.0, 1000.0 + 0.075),
                (1000.0, 1e6 + 10000.0),
                (1e6, 1e9),
            ],
        }
    }
}

/// Camera state the forest reads while selecting tiles.
#[derive(Debug, Clone, Resource)]
pub struct PlanetCamera {
    pub eye: DVec3,
    pub direction: DVec3,
    pub up: DVec3,
    /// Opposite of the view direction.
    pub backward: DVec3,
    pub lon_lat: LonLat,
    pub lon_lat_merc: LonLat,
    /// Dot of the backward vector with the eye normal, 1 when looking straight down.
    pub slope: f64,
    pub frustums: Vec<CullingVolume>,
    proj_size_const: f64,
}

impl PlanetCamera {
    pub fn new(ellipsoid: &Ellipsoid, eye: DVec3, target: DVec3, up: DVec3, view: &CameraView) -> Self {
        let direction = (target - eye).normalize_or_zero();
        let right = direction.cross(up).normalize_or_zero();
        let up = right.cross(direction).normalize_or_zero();
        let aspect = if view.height > 0.0 { view.width / view.height } else { 1.0 };
        let fov_y = view.fov_y_degrees.to_radians();
        let frustums = view
            .frustums
            .iter()
            .map(|(near, far)| {
                CullingVolume::from_perspective(eye, direction, up, fov_y, aspect, *near, *far)
            })
            .collect();
        let lon_lat = ellipsoid.cartesian_to_lon_lat(eye);
        let backward = -direction;
        Self {
            eye,
            direction,
            up,
            backward,
            lon_lat,
            lon_lat_merc: lon_lat.forward_mercator(),
            slope: backward.dot(eye.normalize_or_zero()),
            frustums,
            proj_size_const: view.width.min(view.height) / fov_y,
        }
    }

    /// Camera hovering at `lon_lat` and looking at the ground below, north up.
    pub fn looking_down(ellipsoid: &Ellipsoid, lon_lat: LonLat, view: &CameraView) -> Self {
        let eye = ellipsoid.lon_lat_to_cartesian(&lon_lat);
        let ground = ellipsoid.lon_lat_to_cartesian(&LonLat::new(lon_lat.lon, lon_lat.lat, 0.0));
        let normal = ellipsoid.geodetic_surface_normal_lon_lat(&lon_lat);
        let mut up = DVec3::Z - normal * normal.z;
        if up.length_squared() < 1e-12 {
            up = DVec3::X;
        }
        let target = if (eye - ground).length_squared() > 0.0 { ground } else { eye - normal };
        Self::new(ellipsoid, eye, target, up.normalize(), view)
    }

    pub fn height(&self) -> f64 {
        self.lon_lat.height
    }

    pub fn frustum_count(&self) -> usize {
        self.frustums.len()
    }

    /// Size in pixels of a sphere of `radius` at `center`.
    pub fn projected_size(&self, center: DVec3, radius: f64) -> f64 {
        let distance = self.eye.distance(center);
        if distance == 0.0 {
            return f64::MAX;
        }
        (radius / distance).atan() * self.proj_size_const
    }
}
