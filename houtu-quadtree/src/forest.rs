//! The forest of quadtrees that covers a planet and everything that lives
//! longer than one frame: node storage, workers, locks and memory sweeps.
use std::{collections::HashMap, sync::Arc};

use bevy::{
    log::{debug, info},
    math::DVec3,
    prelude::Resource,
};
use houtu_scene::{math::lerp, math::log2_u32, Ellipsoid, Extent};

use crate::{
    arena::NodeArena,
    camera::PlanetCamera,
    config::QuadForestConfig,
    error::Result,
    indexes::IndexCache,
    lock::{Key, KeyAllocator, Lock},
    node::{Node, NodeId, NodeIdx},
    normal_map::NormalMapQueue,
    quad::NodeState,
    strategy::QuadTreeStrategy,
    terrain_provider::TerrainProvider,
    tile::{Tile, TileGroup},
    traversal::TreePass,
    workers::TileWorkers,
};

/// Counters for logs and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForestStats {
    pub nodes: usize,
    pub created_nodes: usize,
    pub rendered_nodes: usize,
    pub pending_plain: usize,
    pub pending_terrain: usize,
    pub terrain_loading: usize,
    pub normal_map_queue: usize,
    pub dropped_results: usize,
    pub mem_clears: usize,
}

#[derive(Resource)]
pub struct QuadForest {
    pub(crate) config: QuadForestConfig,
    pub(crate) ellipsoid: Ellipsoid,
    pub(crate) strategy: Box<dyn QuadTreeStrategy>,
    pub(crate) terrain: Box<dyn TerrainProvider>,
    pub(crate) arena: NodeArena,
    pub(crate) roots: Vec<NodeIdx>,
    pub(crate) workers: TileWorkers,
    pub(crate) normal_maps: NormalMapQueue,
    pub(crate) index_cache: IndexCache,
    keys: KeyAllocator,
    layer_lock: Lock,
    pub(crate) terrain_lock: Lock,
    mem_key: Key,

    pub(crate) lod_size: f64,
    pub(crate) rendered_nodes: Vec<NodeIdx>,
    pub(crate) rendered_in_frustum: Vec<Vec<NodeIdx>>,
    pub(crate) visible_nodes: [HashMap<NodeId, NodeIdx>; 3],
    pub(crate) view_extent: Extent,
    pub(crate) min_curr_zoom: Option<u32>,
    pub(crate) max_curr_zoom: Option<u32>,
    pub(crate) camera_inside: Option<NodeIdx>,
    pub(crate) fading_opaque: Vec<NodeIdx>,
    pub(crate) render_completed: bool,
    pub(crate) terrain_completed: bool,

    clock: instant::Instant,
    prev_eye: Option<DVec3>,
    dist_before_mem_clear: f64,
    mem_clears: usize,
}

impl QuadForest {
    pub fn new(
        config: QuadForestConfig,
        ellipsoid: Ellipsoid,
        strategy: impl QuadTreeStrategy + 'static,
        terrain: impl TerrainProvider + 'static,
    ) -> Result<Self> {
        terrain.config().validate()?;
        let max_grid = {
            let t = terrain.config();
            t.grid_size_by_zoom
                .iter()
                .copied()
                .chain([t.plain_grid_size, t.file_grid_size])
                .max()
                .unwrap_or(1)
        };
        let mut keys = KeyAllocator::default();
        let mem_key = keys.next_key();
        let mut forest = Self {
            workers: TileWorkers::new(config.plain_workers, config.terrain_workers),
            lod_size: config.cur_lod_size,
            config,
            ellipsoid,
            strategy: Box::new(strategy),
            terrain: Box::new(terrain),
            arena: NodeArena::new(),
            roots: vec![],
            normal_maps: NormalMapQueue::new(),
            index_cache: IndexCache::new(log2_u32(max_grid)),
            keys,
            layer_lock: Lock::default(),
            terrain_lock: Lock::default(),
            mem_key,
            rendered_nodes: vec![],
            rendered_in_frustum: vec![],
            visible_nodes: Default::default(),
            view_extent: Extent::empty_lon_lat(),
            min_curr_zoom: None,
            max_curr_zoom: None,
            camera_inside: None,
            fading_opaque: vec![],
            render_completed: false,
            terrain_completed: false,
            clock: instant::Instant::now(),
            prev_eye: None,
            dist_before_mem_clear: 0.0,
            mem_clears: 0,
        };
        forest.create_roots();
        info!(
            "{} forest with {} roots",
            forest.strategy.name(),
            forest.roots.len()
        );
        Ok(forest)
    }

    fn create_roots(&mut self) {
        for root in self.strategy.roots() {
            let tile = Tile::new(root.kind, 0, root.extent, self.terrain.config());
            let id = self.arena.next_id();
            let idx = self.arena.insert(Node::new(id, None, None, tile));
            self.create_bounds(idx);
            self.roots.push(idx);
        }
    }

    /// Milliseconds since the forest was made.
    pub(crate) fn now_ms(&self) -> f64 {
        self.clock.elapsed().as_secs_f64() * 1000.0
    }

    /// One frame: takes in finished work, selects the tiles to draw and
    /// prepares their surfaces.
    pub fn frame(&mut self, camera: &PlanetCamera) {
        self.poll_workers();
        self.poll_terrain();
        self.check_mem_clear(camera);
        self.collect_render_nodes(camera);
        if self.config.transition_opacity_enabled {
            self.collect_fading();
        }
        self.equalize_rendered();
        self.create_normal_maps();
    }

    fn collect_render_nodes(&mut self, camera: &PlanetCamera) {
        self.lod_size = lerp(
            camera.slope.max(0.0),
            self.config.cur_lod_size,
            self.config.min_lod_size,
        );
        self.clear_frame_lists(camera.frustum_count());
        self.render_completed = true;
        self.terrain_completed = true;

        for root in self.roots.clone() {
            self.render_tree(camera, root, TreePass::default());
        }

        let h = camera.height();
        if camera.slope > self.config.min_equal_zoom_camera_slope
            && h < self.config.max_equal_zoom_altitude
            && h > self.config.min_equal_zoom_altitude
        {
            self.equal_zoom_pass(camera);
        }
    }

    /// Redraws the tiles facing the camera at the deepest zoom of the first
    /// pass so the visible surface has one resolution.
    fn equal_zoom_pass(&mut self, camera: &PlanetCamera) {
        let Some(max_zoom) = self.max_curr_zoom else {
            return;
        };
        self.min_curr_zoom = Some(max_zoom);

        let first_pass = std::mem::take(&mut self.rendered_nodes);
        for list in self.rendered_in_frustum.iter_mut() {
            list.clear();
        }
        let mut again = vec![];
        for idx in first_pass {
            let Some(node) = self.arena.get(idx) else {
                continue;
            };
            let facing = node.tile.center_normal.dot(camera.backward);
            if node.zoom() == max_zoom || facing < self.config.horizon_tangent {
                let in_frustum = node.in_frustum;
                if !self.config.transition_opacity_enabled {
                    if let Some(node) = self.arena.get_mut(idx) {
                        node.clear_neighbors();
                    }
                    self.get_rendered_nodes_neighbors(idx);
                }
                self.rendered_nodes.push(idx);
                self.push_in_frustum(idx, in_frustum);
            } else {
                again.push(idx);
            }
        }
        for idx in again {
            self.render_tree(
                camera,
                idx,
                TreePass {
                    max_zoom: Some(max_zoom),
                    ..TreePass::default()
                },
            );
        }
    }

    fn clear_frame_lists(&mut self, frustums: usize) {
        self.camera_inside = None;
        self.rendered_nodes.clear();
        self.rendered_in_frustum.resize_with(frustums, Vec::new);
        for list in self.rendered_in_frustum.iter_mut() {
            list.clear();
        }
        for group in self.visible_nodes.iter_mut() {
            group.clear();
        }
        self.view_extent = Extent::empty_lon_lat();
        self.min_curr_zoom = None;
        self.max_curr_zoom = None;
        self.fading_opaque.clear();
    }

    pub(crate) fn push_in_frustum(&mut self, idx: NodeIdx, in_frustum: u32) {
        for (i, list) in self.rendered_in_frustum.iter_mut().enumerate() {
            if in_frustum & (1 << i) != 0 {
                list.push(idx);
            }
        }
    }

    /// Copies shared edges between neighbours, then refreshes the meshes of
    /// tiles that changed.
    fn equalize_rendered(&mut self) {
        let equalize = self.terrain.config().equalize_vertices;
        for i in (0..self.rendered_nodes.len()).rev() {
            let idx = self.rendered_nodes[i];
            if equalize {
                self.equalize(idx);
            }
            if let Some(node) = self.arena.get_mut(idx) {
                if node.tile.ready_to_engage {
                    node.tile.engage();
                }
            }
        }
    }

    fn check_mem_clear(&mut self, camera: &PlanetCamera) {
        if let Some(prev) = self.prev_eye {
            self.dist_before_mem_clear += prev.distance(camera.eye);
        }
        self.prev_eye = Some(camera.eye);
        if self.arena.created() > self.config.max_nodes
            && self.dist_before_mem_clear > self.config.min_mem_clear_distance
        {
            self.terrain.clear_cache();
            self.mem_clear();
        }
    }

    /// Destroys every node below the roots and cancels the work in flight.
    pub fn mem_clear(&mut self) {
        self.dist_before_mem_clear = 0.0;
        let key = self.mem_key;
        self.layer_lock.lock(key);
        self.terrain_lock.lock(key);
        self.normal_maps.lock(key);

        self.normal_maps.clear(&mut self.arena);
        self.terrain.abort_loading();
        for root in self.roots.clone() {
            self.destroy_branches(root);
        }
        self.clear_frame_lists(self.rendered_in_frustum.len());

        self.layer_lock.free(key);
        self.terrain_lock.free(key);
        self.normal_maps.free(key);
        self.arena.reset_created();
        self.mem_clears += 1;
        info!("memory cleared, {} nodes left", self.arena.len());
    }

    /// Visits `idx` and every node below it, parents first.
    pub fn traverse_tree(&self, idx: NodeIdx, callback: &mut impl FnMut(NodeIdx, &Node)) {
        let Some(node) = self.arena.get(idx) else {
            return;
        };
        callback(idx, node);
        if let Some(children) = node.children {
            for child in children {
                self.traverse_tree(child, callback);
            }
        }
    }

    /// Drops the branches the last frame did not walk through.
    pub fn clear_tree(&mut self, idx: NodeIdx) {
        match self.get_state(idx) {
            Some(NodeState::NotRendering) | Some(NodeState::Rendering) => {
                self.destroy_branches(idx)
            }
            _ => {
                if let Some(children) = self.arena.get(idx).and_then(|n| n.children) {
                    for child in children {
                        self.clear_tree(child);
                    }
                }
            }
        }
    }

    pub fn destroy_branches(&mut self, idx: NodeIdx) {
        let Some(children) = self.arena.get_mut(idx).and_then(|node| {
            node.fading_nodes.clear();
            node.children.take()
        }) else {
            return;
        };
        for child in children {
            self.destroy_branches(child);
            self.destroy(child);
        }
    }

    fn destroy(&mut self, idx: NodeIdx) {
        let Some(tile_ref) = self.arena.tile_ref(idx) else {
            return;
        };
        let neighbours: Vec<NodeIdx> = match self.arena.get(idx) {
            Some(node) => node.neighbors.iter().flatten().copied().collect(),
            None => vec![],
        };
        for n in neighbours {
            if let Some(node) = self.arena.get_mut(n) {
                node.clear_neighbors();
            }
        }
        self.workers.forget(tile_ref);
        if let Some(mut node) = self.arena.remove(idx) {
            node.state = Some(NodeState::NotRendering);
            node.prev_state = Some(NodeState::NotRendering);
            node.tile.clear();
            debug!("destroyed {} at zoom {}", node.id, node.zoom());
        }
    }

    pub fn config(&self) -> &QuadForestConfig {
        &self.config
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn strategy(&self) -> &dyn QuadTreeStrategy {
        self.strategy.as_ref()
    }

    pub fn terrain(&self) -> &dyn TerrainProvider {
        self.terrain.as_ref()
    }

    pub fn roots(&self) -> &[NodeIdx] {
        &self.roots
    }

    pub fn node(&self, idx: NodeIdx) -> Option<&Node> {
        self.arena.get(idx)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIdx, &Node)> {
        self.arena.iter()
    }

    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Tiles to draw this frame.
    pub fn rendered_nodes(&self) -> &[NodeIdx] {
        &self.rendered_nodes
    }

    pub fn rendered_nodes_in_frustum(&self, frustum: usize) -> &[NodeIdx] {
        self.rendered_in_frustum
            .get(frustum)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn visible_nodes(&self, group: TileGroup) -> &HashMap<NodeId, NodeIdx> {
        &self.visible_nodes[group as usize]
    }

    /// Parent tiles still drawn over children that fade in.
    pub fn fading_opaque_nodes(&self) -> &[NodeIdx] {
        &self.fading_opaque
    }

    /// Lon/lat area covered by this frame's tiles.
    pub fn view_extent(&self) -> &Extent {
        &self.view_extent
    }

    pub fn min_curr_zoom(&self) -> Option<u32> {
        self.min_curr_zoom
    }

    pub fn max_curr_zoom(&self) -> Option<u32> {
        self.max_curr_zoom
    }

    pub fn lod_size(&self) -> f64 {
        self.lod_size
    }

    pub fn camera_inside_tile(&self) -> Option<&Tile> {
        self.camera_inside
            .and_then(|idx| self.arena.get(idx))
            .map(|n| &n.tile)
    }

    /// Every drawn tile already shows its own terrain.
    pub fn is_render_completed(&self) -> bool {
        self.render_completed
    }

    pub fn is_terrain_completed(&self) -> bool {
        self.terrain_completed
    }

    /// Index strip for a tile with its current side resolutions.
    pub fn tile_indexes(&mut self, idx: NodeIdx) -> Option<Arc<Vec<u32>>> {
        let node = self.arena.get(idx)?;
        let size_log2 = log2_u32(node.tile.grid_size);
        let sides = node.side_size_log2.map(|s| s.min(size_log2));
        self.index_cache.get(size_log2, sides)
    }

    /// Distance along the surface normal from `xyz` down to the terrain
    /// under the camera, and the point hit.
    pub fn get_terrain_point(&self, xyz: DVec3) -> Option<(f64, DVec3)> {
        let lon_lat = self.ellipsoid.cartesian_to_lon_lat(xyz);
        match self.camera_inside_tile() {
            Some(tile) => {
                let inside = tile.inside_lon_lat(&lon_lat, &lon_lat.forward_mercator());
                tile.get_terrain_point(&self.ellipsoid, xyz, &inside)
            }
            None => {
                let norm = self.ellipsoid.geodetic_surface_normal(xyz)?;
                let hit = self.ellipsoid.hit_ray(xyz, -norm)?;
                Some((xyz.distance(hit), hit))
            }
        }
    }

    pub fn next_key(&mut self) -> Key {
        self.keys.next_key()
    }

    /// Held while imagery for the tiles must not start.
    pub fn layer_lock_mut(&mut self) -> &mut Lock {
        &mut self.layer_lock
    }

    /// Held while no new elevation request may start.
    pub fn terrain_lock_mut(&mut self) -> &mut Lock {
        &mut self.terrain_lock
    }

    pub fn normal_map_queue_mut(&mut self) -> &mut NormalMapQueue {
        &mut self.normal_maps
    }

    /// Nothing is computing or loading.
    pub fn is_idle(&self) -> bool {
        self.workers.is_idle() && self.terrain.loading_count() == 0 && self.normal_maps.is_empty()
    }

    pub fn stats(&self) -> ForestStats {
        ForestStats {
            nodes: self.arena.len(),
            created_nodes: self.arena.created(),
            rendered_nodes: self.rendered_nodes.len(),
            pending_plain: self.workers.pending_plain(),
            pending_terrain: self.workers.pending_terrain(),
            terrain_loading: self.terrain.loading_count(),
            normal_map_queue: self.normal_maps.len(),
            dropped_results: self.workers.dropped(),
            mem_clears: self.mem_clears,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::{Duration, Instant};

    use bevy::tasks::{AsyncComputeTaskPool, TaskPool};
    use houtu_scene::LonLat;

    use super::*;
    use crate::{
        camera::CameraView, quad::Quadrant, strategy::EarthStrategy,
        terrain_provider::EmptyTerrain, tile::create_plain_geometry,
    };

    pub fn init_pool() {
        AsyncComputeTaskPool::init(TaskPool::new);
    }

    pub fn earth(config: QuadForestConfig) -> QuadForest {
        init_pool();
        QuadForest::new(config, Ellipsoid::wgs84(), EarthStrategy, EmptyTerrain::default())
            .unwrap()
    }

    pub fn camera(lon: f64, lat: f64, height: f64) -> PlanetCamera {
        PlanetCamera::looking_down(
            &Ellipsoid::wgs84(),
            LonLat::new(lon, lat, height),
            &CameraView::default(),
        )
    }

    /// Runs frames until the forest has nothing left to do.
    pub fn settle(forest: &mut QuadForest, camera: &PlanetCamera) {
        let deadline = Instant::now() + Duration::from_secs(30);
        let mut quiet = 0;
        while Instant::now() < deadline {
            forest.frame(camera);
            let ready = forest
                .rendered_nodes()
                .iter()
                .all(|idx| forest.node(*idx).map_or(false, |n| n.tile.terrain_ready));
            if forest.is_idle() && ready {
                quiet += 1;
                if quiet > 2 {
                    return;
                }
            } else {
                quiet = 0;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("forest did not settle: {:?}", forest.stats());
    }

    /// Gives a tile its plain surface as final terrain, as a flat provider would.
    pub fn ready_plain(forest: &mut QuadForest, idx: NodeIdx) {
        let terrain = forest.terrain.config().clone();
        let ellipsoid = forest.ellipsoid;
        let node = forest.arena.get_mut(idx).unwrap();
        let log2 = node.tile.initialize(&terrain);
        node.side_size_log2 = [log2; 4];
        let params = node.tile.plain_params(&ellipsoid, &terrain);
        assert!(node.tile.apply_plain_geometry(create_plain_geometry(&params)));
        node.tile.elevations_not_exists(&terrain);
        node.applied_terrain_node_id = Some(node.id);
        assert!(node.tile.terrain_ready);
    }

    /// Walks `path` from the mercator root, splitting nodes on the way.
    pub fn descend(forest: &mut QuadForest, path: &[Quadrant]) -> NodeIdx {
        let mut idx = forest.roots[0];
        for part in path {
            if !forest.arena.get(idx).unwrap().ready() {
                forest.create_children(idx);
            }
            idx = forest.arena.get(idx).unwrap().children.unwrap()[part.index()];
        }
        idx
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::test_support::*;
    use super::*;

    #[test]
    fn roots_follow_the_strategy() {
        let forest = earth(QuadForestConfig::default());
        assert_eq!(forest.roots().len(), 3);
        assert_eq!(forest.node_count(), 3);
        let root = forest.node(forest.roots()[0]).unwrap();
        assert_eq!(root.zoom(), 0);
        assert_eq!(root.tile.bsphere.radius, Ellipsoid::wgs84().equatorial_size());
    }

    #[test]
    fn far_camera_draws_roots_only() {
        let config = QuadForestConfig {
            unconditional_subdivision_zoom: 0,
            ..QuadForestConfig::default()
        };
        let mut forest = earth(config);
        let cam = camera(0.0, 0.0, 1e8);
        settle(&mut forest, &cam);

        assert_eq!(forest.node_count(), 3);
        assert!(!forest.rendered_nodes().is_empty());
        for idx in forest.rendered_nodes() {
            let node = forest.node(*idx).unwrap();
            assert_eq!(node.zoom(), 0);
            assert!(!node.ready());
        }
    }

    #[test]
    fn close_camera_refines_under_itself() {
        let mut forest = earth(QuadForestConfig::default());
        let cam = camera(10.0, 20.0, 20_000.0);
        settle(&mut forest, &cam);

        let inside = forest.camera_inside_tile().unwrap();
        assert!(inside.zoom >= 10, "zoom {}", inside.zoom);
        assert!(inside.extent_lon_lat.is_inside(&cam.lon_lat));
        assert!(forest.max_curr_zoom().unwrap() >= 10);

        let near = Extent::from_array([5.0, 15.0, 15.0, 25.0]);
        for idx in forest.rendered_nodes() {
            let tile = &forest.node(*idx).unwrap().tile;
            if tile.zoom >= 4 {
                assert!(tile.extent_lon_lat.overlaps(&near), "{:?}", tile.extent_lon_lat);
            }
        }
    }

    #[test]
    fn children_come_in_fours_and_sit_inside_parents() {
        let mut rng = rand::thread_rng();
        let mut forest = earth(QuadForestConfig::default());
        for _ in 0..6 {
            let cam = camera(
                rng.gen_range(-180.0..180.0),
                rng.gen_range(-89.0..89.0),
                rng.gen_range(5_000.0..5_000_000.0),
            );
            for _ in 0..40 {
                forest.frame(&cam);
            }
            for (_, node) in forest.nodes() {
                let Some(children) = node.children else {
                    continue;
                };
                let parent = &node.tile.bsphere;
                for child in children {
                    let child = forest.node(child).expect("child is live");
                    assert_eq!(child.zoom(), node.zoom() + 1);
                    let c = &child.tile.corners;
                    for corner in [c.sw, c.nw, c.ne, c.se] {
                        let d = corner.distance(parent.center);
                        assert!(d <= parent.radius * (1.0 + 1e-6) + 1.0);
                    }
                }
            }
        }
    }

    #[test]
    fn mem_clear_keeps_roots_and_drops_late_results() {
        let mut forest = earth(QuadForestConfig::default());
        let cam = camera(30.0, 40.0, 50_000.0);
        for _ in 0..10 {
            forest.frame(&cam);
        }
        assert!(forest.node_count() > 3);

        forest.mem_clear();
        assert_eq!(forest.node_count(), 3);
        assert_eq!(forest.stats().created_nodes, 0);
        assert!(forest.rendered_nodes().is_empty());
        for root in forest.roots().to_vec() {
            assert!(!forest.node(root).unwrap().ready());
        }
        // results for destroyed tiles arrive and are ignored
        settle(&mut forest, &cam);
        assert_eq!(forest.stats().mem_clears, 1);
    }

    #[test]
    fn moving_far_sweeps_memory() {
        let config = QuadForestConfig {
            max_nodes: 20,
            min_mem_clear_distance: 10.0,
            ..QuadForestConfig::default()
        };
        let mut forest = earth(config);
        let a = camera(0.0, 0.0, 100_000.0);
        settle(&mut forest, &a);
        assert!(forest.stats().created_nodes > 20);
        let b = camera(0.1, 0.0, 100_000.0);
        forest.frame(&b);
        assert_eq!(forest.stats().mem_clears, 1);
    }

    #[test]
    fn clear_tree_keeps_the_walked_path() {
        let mut forest = earth(QuadForestConfig::default());
        let cam = camera(10.0, 20.0, 200_000.0);
        settle(&mut forest, &cam);
        let before = forest.node_count();
        let rendered = forest.rendered_nodes().to_vec();
        let root = forest.roots()[0];
        forest.clear_tree(root);

        assert!(forest.node_count() <= before);
        for idx in rendered {
            let node = forest.node(idx).expect("drawn tiles survive");
            assert!(!node.ready());
        }
        let mut walked = vec![];
        forest.traverse_tree(root, &mut |idx, _| walked.push(idx));
        let walked: Vec<_> = walked
            .into_iter()
            .filter(|idx| forest.get_state(*idx) == Some(NodeState::Walkthrough))
            .collect();
        assert!(!walked.is_empty());
        for idx in walked {
            assert!(forest.node(idx).unwrap().ready());
        }
    }

    #[test]
    fn terrain_point_under_the_camera() {
        let mut forest = earth(QuadForestConfig::default());
        let cam = camera(10.0, 20.0, 20_000.0);
        settle(&mut forest, &cam);
        let (distance, _) = forest.get_terrain_point(cam.eye).unwrap();
        assert!((distance - 20_000.0).abs() < 100.0, "{}", distance);
    }
}
