use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Tuning of the forest. Every key is optional in JSON, unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuadForestConfig {
    /// Screen size in pixels under which a tile stops refining when looking down.
    pub cur_lod_size: f64,
    /// Same threshold when looking at the horizon.
    pub min_lod_size: f64,
    /// Refinement limit used by the equal zoom pass.
    pub max_lod_size: f64,
    pub max_nodes: usize,
    pub min_mem_clear_distance: f64,
    pub max_rendered_nodes: usize,
    pub max_equal_zoom_altitude: f64,
    pub min_equal_zoom_altitude: f64,
    pub min_equal_zoom_camera_slope: f64,
    /// Cosine between the tile normal and the camera backward vector above
    /// which the equal zoom pass leaves a tile alone.
    pub horizon_tangent: f64,
    pub height_factor: f64,
    pub transition_opacity_enabled: bool,
    pub transition_duration_ms: f64,
    pub light_enabled: bool,
    pub plain_workers: usize,
    pub terrain_workers: usize,
    pub normal_map_budget_ms: f64,
    pub min_equalize_zoom: u32,
    /// Tiles above this zoom are always split, whatever the camera sees.
    pub unconditional_subdivision_zoom: u32,
}

impl Default for QuadForestConfig {
    fn default() -> Self {
        Self {
            cur_lod_size: 250.0,
            min_lod_size: 312.0,
            max_lod_size: 190.0,
            max_nodes: 200,
            min_mem_clear_distance: 1000.0,
            max_rendered_nodes: 1000,
            max_equal_zoom_altitude: 15_000_000.0,
            min_equal_zoom_altitude: 10_000.0,
            min_equal_zoom_camera_slope: 0.8,
            horizon_tangent: 0.81,
            height_factor: 1.0,
            transition_opacity_enabled: false,
            transition_duration_ms: 580.0,
            light_enabled: true,
            plain_workers: 2,
            terrain_workers: 4,
            normal_map_budget_ms: 0.25,
            min_equalize_zoom: 8,
            unconditional_subdivision_zoom: 2,
        }
    }
}

impl QuadForestConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Deepest zoom whose `2^zoom` columns fit a `u32` tile index.
pub const MAX_NODE_ZOOM: u32 = 31;

/// Capabilities of a terrain source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TerrainConfig {
    pub min_zoom: u32,
    pub max_zoom: u32,
    pub max_native_zoom: u32,
    /// Vertex grid size of a tile per zoom, the last index is the deepest
    /// zoom the tree refines to.
    pub grid_size_by_zoom: Vec<u32>,
    pub plain_grid_size: u32,
    /// Grid size of the elevation data delivered for one tile.
    pub file_grid_size: u32,
    pub equalize_vertices: bool,
    pub equalize_normals: bool,
    pub no_data_values: Vec<f32>,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        TerrainConfig::empty()
    }
}

impl TerrainConfig {
    /// Smooth ellipsoid, no elevation source.
    pub fn empty() -> Self {
        let mut grid_size_by_zoom = vec![64, 32, 16, 8, 4, 4, 4, 4];
        grid_size_by_zoom.resize(26, 2);
        Self {
            min_zoom: 2,
            max_zoom: 50,
            max_native_zoom: 50,
            grid_size_by_zoom,
            plain_grid_size: 2,
            file_grid_size: 2,
            equalize_vertices: false,
            equalize_normals: false,
            no_data_values: vec![],
        }
    }

    pub fn elevation() -> Self {
        Self {
            min_zoom: 3,
            max_zoom: 14,
            max_native_zoom: 14,
            grid_size_by_zoom: vec![
                64, 32, 32, 16, 16, 8, 8, 8, 16, 16, 16, 32, 32, 32, 32, 16, 8, 4, 2, 2, 2, 2, 2, 2,
            ],
            plain_grid_size: 32,
            file_grid_size: 32,
            equalize_vertices: true,
            equalize_normals: true,
            no_data_values: vec![-32767.0],
        }
    }

    /// Deepest zoom a tile is split to.
    pub fn max_node_zoom(&self) -> u32 {
        self.grid_size_by_zoom.len().saturating_sub(1) as u32
    }

    pub fn grid_size_at(&self, zoom: u32) -> u32 {
        self.grid_size_by_zoom
            .get(zoom as usize)
            .copied()
            .unwrap_or(self.plain_grid_size)
    }

    pub fn is_no_data(&self, value: f32) -> bool {
        self.no_data_values.iter().any(|v| *v == value)
    }

    /// Index tables and sub-grid lookups assume power of two grids. Tile
    /// columns are `u32`, which bounds the tree depth.
    pub fn validate(&self) -> Result<()> {
        if self.max_node_zoom() > MAX_NODE_ZOOM {
            return Err(Error::ZoomTooDeep {
                zoom: self.max_node_zoom(),
                max: MAX_NODE_ZOOM,
            });
        }
        let sizes = self
            .grid_size_by_zoom
            .iter()
            .copied()
            .enumerate()
            .chain([(usize::MAX, self.plain_grid_size), (usize::MAX, self.file_grid_size)]);
        for (zoom, size) in sizes {
            if !size.is_power_of_two() {
                return Err(Error::InvalidGridSize { zoom, size });
            }
        }
        Ok(())
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: TerrainConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
