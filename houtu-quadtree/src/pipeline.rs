//! Plain surfaces, elevation requests and terrain surfaces on their way from
//! the workers and the provider back to the tiles.
use std::sync::Arc;

use bevy::log::{debug, warn};

use crate::{
    forest::QuadForest,
    node::{NodeIdx, TileRef},
    terrain_provider::{TerrainRequest, TerrainResponse, TileKey},
};

impl QuadForest {
    /// Applies finished worker results to the tiles still waiting for them.
    pub(crate) fn poll_workers(&mut self) {
        for delivery in self.workers.poll_plain() {
            let Some(node) = self.arena.resolve_mut(delivery.tile) else {
                self.workers.note_stale(delivery.token);
                continue;
            };
            if node.tile.plain_token != Some(delivery.token) {
                self.workers.note_stale(delivery.token);
                continue;
            }
            node.tile.plain_token = None;
            node.tile.apply_plain_geometry(delivery.outcome);
        }

        for delivery in self.workers.poll_terrain() {
            let tile_ref = delivery.tile;
            let Some(node) = self.arena.resolve_mut(tile_ref) else {
                self.workers.note_stale(delivery.token);
                continue;
            };
            if node.tile.terrain_token != Some(delivery.token) {
                self.workers.note_stale(delivery.token);
                continue;
            }
            node.tile.terrain_token = None;
            match delivery.outcome {
                Ok(geometry) => {
                    if !node.tile.plain_ready {
                        continue;
                    }
                    node.tile.apply_terrain_geometry(geometry);
                    node.applied_terrain_node_id = Some(node.id);
                    node.equalized_side_with_node_id = [node.id; 4];
                    if self.config.light_enabled && !node.tile.in_the_queue {
                        self.normal_maps.queue(tile_ref, &mut node.tile);
                    }
                }
                Err(err) => {
                    warn!("terrain for {} rejected: {}", node.id, err);
                    self.elevations_not_exists(tile_ref.idx);
                }
            }
        }
    }

    /// Takes the provider's answers.
    pub(crate) fn poll_terrain(&mut self) {
        for (request, response) in self.terrain.poll() {
            self.apply_terrain_response(request.tile, response);
        }
    }

    fn apply_terrain_response(&mut self, tile_ref: TileRef, response: TerrainResponse) {
        if self.arena.resolve(tile_ref).is_none() {
            debug!("terrain answer for destroyed {}", tile_ref.id);
            return;
        }
        match response {
            TerrainResponse::Elevations(heights) => self.elevations_exists(tile_ref.idx, heights),
            TerrainResponse::NotExists => self.elevations_not_exists(tile_ref.idx),
            TerrainResponse::Aborted => {
                if let Some(node) = self.arena.resolve_mut(tile_ref) {
                    node.tile.terrain_is_loading = false;
                }
            }
        }
    }

    /// Starts the plain surface of a tile on the workers.
    pub(crate) fn create_plain_async(&mut self, idx: NodeIdx) {
        let terrain = self.terrain.config();
        if !self.terrain.is_ready() {
            return;
        }
        let Some(tile_ref) = self.arena.tile_ref(idx) else {
            return;
        };
        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        let tile = &mut node.tile;
        if tile.plain_ready || tile.plain_processing || tile.zoom > terrain.max_zoom {
            return;
        }
        if !tile.initialized {
            let log2 = tile.initialize(terrain);
            node.side_size_log2 = [log2; 4];
        }
        let params = node.tile.plain_params(&self.ellipsoid, terrain);
        node.tile.plain_processing = true;
        node.tile.plain_token = Some(self.workers.submit_plain(tile_ref, params));
    }

    /// Asks the provider for the tile's elevations. Tiles the provider can
    /// not have are settled on the spot.
    pub(crate) fn load_terrain(&mut self, idx: NodeIdx, force: bool) {
        let config = self.terrain.config();
        let (min_zoom, max_zoom) = (config.min_zoom, config.max_zoom);
        let coverage = self.terrain.extent();
        let Some(tile_ref) = self.arena.tile_ref(idx) else {
            return;
        };
        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        let tile = &mut node.tile;

        if tile.zoom < min_zoom {
            tile.terrain_is_loading = true;
            self.elevations_not_exists(idx);
            return;
        }
        if tile.zoom > max_zoom {
            self.elevations_not_exists(idx);
            return;
        }
        if tile.terrain_is_loading || tile.terrain_ready {
            return;
        }
        if !coverage.overlaps(&tile.extent_lon_lat) {
            tile.terrain_is_loading = true;
            self.elevations_not_exists(idx);
            return;
        }
        if self.terrain_lock.is_locked() {
            return;
        }
        let request = TerrainRequest {
            tile: tile_ref,
            key: TileKey {
                group: tile.group,
                x: tile.x,
                y: tile.y,
                zoom: tile.zoom,
            },
            extent: tile.extent,
            projection: tile.projection(),
        };
        tile.terrain_is_loading = true;
        if let Some(response) = self.terrain.load_terrain(request, force) {
            self.apply_terrain_response(tile_ref, response);
        }
    }

    /// Elevations arrived: the terrain surface is built on the workers.
    pub(crate) fn elevations_exists(&mut self, idx: NodeIdx, heights: Arc<Vec<f32>>) {
        let now = self.now_ms();
        let height_factor = self.config.height_factor;
        let config = self.terrain.config();
        let Some(tile_ref) = self.arena.tile_ref(idx) else {
            return;
        };
        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        let tile = &mut node.tile;
        if !tile.plain_ready || !tile.terrain_is_loading {
            return;
        }
        let Some(params) = tile.terrain_params(heights.to_vec(), config, height_factor) else {
            warn!("{} has no plain surface to displace", node.id);
            self.elevations_not_exists(idx);
            return;
        };
        tile.begin_terrain_transition(now);
        tile.terrain_token = Some(self.workers.submit_terrain(tile_ref, params));
    }

    /// The provider has nothing for this tile: it keeps its plain surface
    /// or what it borrowed, for good.
    pub(crate) fn elevations_not_exists(&mut self, idx: NodeIdx) {
        let light = self.config.light_enabled;
        let config = self.terrain.config();
        let Some(tile_ref) = self.arena.tile_ref(idx) else {
            return;
        };
        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        if !node.tile.elevations_not_exists(config) {
            return;
        }
        node.applied_terrain_node_id = Some(node.id);
        node.equalized_side_with_node_id = [node.id; 4];
        if light && !node.tile.in_the_queue {
            self.normal_maps.queue(tile_ref, &mut node.tile);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use houtu_jobs::JobToken;
    use houtu_scene::{Ellipsoid, Extent};

    use super::*;
    use crate::{
        config::{QuadForestConfig, TerrainConfig},
        forest::test_support::*,
        quad::Quadrant::*,
        strategy::EarthStrategy,
        terrain_provider::{GeneratedTerrain, TerrainProvider},
        tile::TerrainState,
    };

    fn wait_for(forest: &mut QuadForest, mut done: impl FnMut(&QuadForest) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            forest.poll_workers();
            forest.poll_terrain();
            if done(forest) {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("timed out: {:?}", forest.stats());
    }

    fn state(forest: &QuadForest, idx: NodeIdx) -> TerrainState {
        forest.node(idx).unwrap().tile.terrain_state()
    }

    fn hills() -> QuadForest {
        init_pool();
        let terrain = GeneratedTerrain::new(TerrainConfig::elevation(), |_, _| Some(500.0), 2);
        QuadForest::new(QuadForestConfig::default(), Ellipsoid::wgs84(), EarthStrategy, terrain)
            .unwrap()
    }

    /// Always answers with a grid of the wrong size.
    struct BrokenTerrain(TerrainConfig);

    impl TerrainProvider for BrokenTerrain {
        fn config(&self) -> &TerrainConfig {
            &self.0
        }

        fn load_terrain(&mut self, _: TerrainRequest, _: bool) -> Option<TerrainResponse> {
            Some(TerrainResponse::Elevations(Arc::new(vec![1.0; 5])))
        }

        fn poll(&mut self) -> Vec<(TerrainRequest, TerrainResponse)> {
            vec![]
        }

        fn abort_loading(&mut self) {}

        fn clear_cache(&mut self) {}

        fn loading_count(&self) -> usize {
            0
        }
    }

    #[test]
    fn flat_globe_keeps_the_plain_surface() {
        let mut forest = earth(QuadForestConfig::default());
        let idx = descend(&mut forest, &[NorthWest, NorthEast, SouthEast]);
        forest.create_plain_async(idx);
        assert!(forest.node(idx).unwrap().tile.plain_processing);
        wait_for(&mut forest, |f| f.node(idx).unwrap().tile.plain_ready);

        forest.load_terrain(idx, false);
        let node = forest.node(idx).unwrap();
        assert_eq!(state(&forest, idx), TerrainState::Absent);
        assert_eq!(node.applied_terrain_node_id, Some(node.id));
        assert_eq!(node.tile.terrain_vertices, node.tile.plain_vertices);
        assert!(node.tile.in_the_queue);
    }

    #[test]
    fn elevations_lift_the_surface() {
        let mut forest = hills();
        let idx = descend(&mut forest, &[NorthWest, NorthEast, SouthEast]);
        forest.create_plain_async(idx);
        wait_for(&mut forest, |f| f.node(idx).unwrap().tile.plain_ready);

        forest.load_terrain(idx, false);
        assert_eq!(state(&forest, idx), TerrainState::Loading);
        wait_for(&mut forest, |f| f.node(idx).unwrap().tile.terrain_ready);

        let tile = &forest.node(idx).unwrap().tile;
        assert_eq!(tile.terrain_state(), TerrainState::Ready);
        assert_eq!(tile.grid_size, 16);
        let plain = tile.plain_vertices.as_ref().unwrap().get(0).unwrap();
        let lifted = tile.terrain_vertices.as_ref().unwrap().get(0).unwrap();
        assert!((lifted.length() - plain.length() - 500.0).abs() < 1.0);
        assert!(tile.bbox.contains_point(lifted));
    }

    #[test]
    fn shallow_tiles_skip_the_provider() {
        let mut forest = hills();
        let idx = descend(&mut forest, &[NorthWest, NorthEast]);
        forest.create_plain_async(idx);
        wait_for(&mut forest, |f| f.node(idx).unwrap().tile.plain_ready);
        forest.load_terrain(idx, false);
        assert_eq!(state(&forest, idx), TerrainState::Absent);
        assert_eq!(forest.terrain.loading_count(), 0);
    }

    #[test]
    fn tiles_outside_the_coverage_skip_the_provider() {
        init_pool();
        let terrain = GeneratedTerrain::new(TerrainConfig::elevation(), |_, _| Some(500.0), 2)
            .with_extent(Extent::from_array([170.0, -10.0, 171.0, -9.0]));
        let mut forest =
            QuadForest::new(QuadForestConfig::default(), Ellipsoid::wgs84(), EarthStrategy, terrain)
                .unwrap();
        let idx = descend(&mut forest, &[NorthWest, NorthEast, SouthEast]);
        forest.create_plain_async(idx);
        wait_for(&mut forest, |f| f.node(idx).unwrap().tile.plain_ready);

        forest.load_terrain(idx, false);
        assert_eq!(forest.terrain.loading_count(), 0);
        assert_eq!(state(&forest, idx), TerrainState::Absent);
        let node = forest.node(idx).unwrap();
        assert_eq!(node.applied_terrain_node_id, Some(node.id));
    }

    #[test]
    fn covered_tiles_still_load() {
        init_pool();
        let terrain = GeneratedTerrain::new(TerrainConfig::elevation(), |_, _| Some(500.0), 2)
            .with_extent(Extent::from_array([0.0, 0.0, 90.0, 85.0]));
        let mut forest =
            QuadForest::new(QuadForestConfig::default(), Ellipsoid::wgs84(), EarthStrategy, terrain)
                .unwrap();
        // zoom 3 tile at x 5, y 1: lon 45..90, north of the equator
        let idx = descend(&mut forest, &[NorthEast, NorthWest, SouthEast]);
        forest.create_plain_async(idx);
        wait_for(&mut forest, |f| f.node(idx).unwrap().tile.plain_ready);

        forest.load_terrain(idx, false);
        assert_eq!(state(&forest, idx), TerrainState::Loading);
        assert_eq!(forest.terrain.loading_count(), 1);
    }

    #[test]
    fn terrain_lock_holds_new_requests() {
        let mut forest = hills();
        let idx = descend(&mut forest, &[NorthWest, NorthEast, SouthEast]);
        forest.create_plain_async(idx);
        wait_for(&mut forest, |f| f.node(idx).unwrap().tile.plain_ready);

        let key = forest.next_key();
        forest.terrain_lock_mut().lock(key);
        forest.load_terrain(idx, false);
        assert_eq!(state(&forest, idx), TerrainState::PlainReady);
        assert_eq!(forest.terrain.loading_count(), 0);

        forest.terrain_lock_mut().free(key);
        forest.load_terrain(idx, false);
        assert_eq!(state(&forest, idx), TerrainState::Loading);
    }

    #[test]
    fn superseded_plain_job_is_dropped() {
        let mut forest = earth(QuadForestConfig::default());
        let idx = descend(&mut forest, &[SouthWest, SouthWest, NorthEast]);
        forest.create_plain_async(idx);
        let first = forest.node(idx).unwrap().tile.plain_token;
        forest.arena.get_mut(idx).unwrap().tile.plain_processing = false;
        forest.create_plain_async(idx);
        let second = forest.node(idx).unwrap().tile.plain_token;
        assert_ne!(first, second);

        wait_for(&mut forest, |f| f.workers.is_idle() && f.node(idx).unwrap().tile.plain_ready);
        assert_eq!(forest.stats().dropped_results, 1);
        assert_eq!(forest.node(idx).unwrap().tile.plain_token, None);
    }

    #[test]
    fn unknown_token_changes_nothing() {
        let mut forest = earth(QuadForestConfig::default());
        let idx = descend(&mut forest, &[SouthWest, SouthWest, NorthEast]);
        forest.create_plain_async(idx);
        forest.arena.get_mut(idx).unwrap().tile.plain_token = Some(JobToken(u64::MAX));
        wait_for(&mut forest, |f| f.workers.is_idle());
        assert!(!forest.node(idx).unwrap().tile.plain_ready);
        assert_eq!(forest.stats().dropped_results, 1);
    }

    #[test]
    fn malformed_elevations_fall_back_to_plain() {
        init_pool();
        let mut forest = QuadForest::new(
            QuadForestConfig::default(),
            Ellipsoid::wgs84(),
            EarthStrategy,
            BrokenTerrain(TerrainConfig::elevation()),
        )
        .unwrap();
        let idx = descend(&mut forest, &[NorthWest, NorthEast, SouthEast]);
        forest.create_plain_async(idx);
        wait_for(&mut forest, |f| f.node(idx).unwrap().tile.plain_ready);

        forest.load_terrain(idx, false);
        wait_for(&mut forest, |f| f.node(idx).unwrap().tile.terrain_ready);
        assert_eq!(state(&forest, idx), TerrainState::Absent);
    }

    #[test]
    fn aborted_request_can_load_again() {
        let mut forest = hills();
        let idx = descend(&mut forest, &[NorthWest, NorthEast, SouthEast]);
        forest.create_plain_async(idx);
        wait_for(&mut forest, |f| f.node(idx).unwrap().tile.plain_ready);
        let tile_ref = forest.arena.tile_ref(idx).unwrap();

        forest.arena.get_mut(idx).unwrap().tile.terrain_is_loading = true;
        forest.apply_terrain_response(tile_ref, TerrainResponse::Aborted);
        assert_eq!(state(&forest, idx), TerrainState::PlainReady);
        forest.load_terrain(idx, true);
        assert_eq!(state(&forest, idx), TerrainState::Loading);
    }
}
