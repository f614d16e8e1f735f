//! Terrain lifecycle of a tile: plain surface first, then elevations or the
//! permanent decision that there are none.
use std::sync::Arc;

use houtu_scene::Ellipsoid;

use super::{PlainGeometry, PlainParams, TerrainGeometry, TerrainParams, Tile};
use crate::config::TerrainConfig;

/// Where a tile is in its terrain lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerrainState {
    Uninitialized,
    PlainReady,
    Loading,
    /// Elevations applied, or borrowed for good from an ancestor.
    Ready,
    /// Renders its plain surface for good.
    Absent,
}

impl Tile {
    pub fn terrain_state(&self) -> TerrainState {
        if self.terrain_ready {
            if self.terrain_exists {
                TerrainState::Ready
            } else {
                TerrainState::Absent
            }
        } else if self.terrain_is_loading {
            TerrainState::Loading
        } else if self.plain_ready {
            TerrainState::PlainReady
        } else {
            TerrainState::Uninitialized
        }
    }

    pub fn plain_params(&self, ellipsoid: &Ellipsoid, terrain: &TerrainConfig) -> PlainParams {
        PlainParams {
            projection: self.projection(),
            grid_size: terrain.grid_size_at(self.zoom),
            plain_grid_size: terrain.plain_grid_size,
            extent: self.extent,
            ellipsoid: *ellipsoid,
        }
    }

    /// Input of the terrain job, `None` until the plain surface exists.
    pub fn terrain_params(
        &self,
        elevations: Vec<f32>,
        terrain: &TerrainConfig,
        height_factor: f64,
    ) -> Option<TerrainParams> {
        let plain = self.plain_vertices.as_ref()?;
        let normal_map = self.normal_map_vertices.as_ref()?;
        Some(TerrainParams {
            elevations,
            plain_vertices: plain.vertices.clone(),
            plain_normals: self.plain_normals.clone()?,
            normal_map_vertices: normal_map.vertices.clone(),
            normal_map_normals: self.normal_map_normals.as_deref()?.clone(),
            height_factor,
            file_grid_size: terrain.file_grid_size,
            grid_size: terrain.grid_size_at(self.zoom),
            no_data_values: terrain.no_data_values.clone(),
        })
    }

    /// Takes the plain surface unless terrain already replaced it.
    pub fn apply_plain_geometry(&mut self, geometry: PlainGeometry) -> bool {
        self.plain_processing = false;
        if !self.initialized || self.terrain_ready {
            return false;
        }
        self.plain_ready = true;
        self.plain_radius = geometry.plain_radius;
        self.plain_vertices = Some(geometry.plain_vertices);
        self.plain_normals = Some(geometry.plain_normals);
        self.file_grid_size = geometry.normal_map_vertices.grid_size();
        self.normal_map_vertices = Some(geometry.normal_map_vertices);
        self.normal_map_normals = Some(Arc::new(geometry.normal_map_normals));
        true
    }

    /// The provider has nothing for this tile. Up to the deepest native zoom
    /// the plain surface becomes the terrain, deeper tiles keep what they
    /// borrowed. Returns whether this closed a running load.
    pub fn elevations_not_exists(&mut self, terrain: &TerrainConfig) -> bool {
        let closing = self.plain_ready && self.terrain_is_loading;
        if closing {
            self.terrain_is_loading = false;
            self.ready_to_engage = true;
        }
        if self.zoom <= terrain.max_native_zoom {
            if let Some(plain) = self.plain_vertices.clone() {
                self.file_grid_size = plain.grid_size();
                self.grid_size = self.file_grid_size;
                self.terrain_vertices = Some(plain);
                self.no_data = None;
                self.terrain_ready = true;
                self.terrain_exists = false;
            }
        } else if closing {
            self.terrain_ready = true;
            self.pass_ready = true;
            self.terrain_exists = false;
        }
        closing
    }

    /// Opacity restarts when fresh elevations are on their way.
    pub fn begin_terrain_transition(&mut self, now_ms: f64) {
        self.transition_timestamp = now_ms;
        self.transition_opacity = 0.0;
    }

    pub fn apply_terrain_geometry(&mut self, geometry: TerrainGeometry) {
        self.ready_to_engage = true;
        self.normal_map_normals = Some(Arc::new(geometry.normal_map_normals));
        self.normal_map_vertices = Some(geometry.normal_map_vertices);
        self.grid_size = geometry.terrain_vertices.grid_size();
        self.terrain_vertices = Some(geometry.terrain_vertices);
        self.no_data = geometry.no_data;
        if !geometry.bounds.is_empty() {
            self.set_bounding_volume_box(geometry.bounds);
        }
        self.terrain_ready = true;
        self.terrain_is_loading = false;
        self.terrain_exists = true;
    }

    /// Drops every buffer derived from terrain or the plain surface.
    pub fn delete_elevations(&mut self) {
        self.terrain_exists = false;
        self.terrain_ready = false;
        self.terrain_is_loading = false;
        self.normal_map_vertices = None;
        self.normal_map_normals = None;
        self.terrain_vertices = None;
        self.no_data = None;
        self.plain_vertices = None;
        self.plain_normals = None;
        self.normal_map_ready = false;
        self.normal_map_texture = None;
        self.applied_neighbors_zoom = [0; 4];
        self.normal_map_bias = [0.0, 0.0, 1.0];
        self.in_the_queue = false;
        self.terrain_token = None;
    }

    pub fn clear(&mut self) {
        self.plain_ready = false;
        self.plain_processing = false;
        self.plain_token = None;
        self.initialized = false;
        self.mesh = None;
        self.delete_elevations();
    }
}
