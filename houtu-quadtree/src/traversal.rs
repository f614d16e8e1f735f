//! Per-frame walk of the forest: culling, level of detail and the list of
//! tiles to draw.
use houtu_scene::{mercator, Extent, LonLat};

use crate::{
    camera::PlanetCamera,
    forest::QuadForest,
    node::{Node, NodeIdx},
    quad::{NodeState, Quadrant},
    tile::{Tile, TileKind},
};

/// Squared distance below which a corner counts as above the horizon,
/// whatever the camera height.
const MIN_HORIZON_DIST_SQR: f64 = 106_876_472_875.632_81;

/// Below this zoom every frustum tests the bounding sphere.
const SPHERE_TEST_ZOOM: u32 = 6;

/// Parameters of one walk down a tree.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TreePass {
    /// Deepest zoom of the equal zoom pass.
    pub max_zoom: Option<u32>,
    /// Node whose terrain the walked tiles may show while theirs loads.
    pub terrain_hint: Option<NodeIdx>,
    pub stop_loading: bool,
}

impl QuadForest {
    pub(crate) fn render_tree(&mut self, camera: &PlanetCamera, idx: NodeIdx, pass: TreePass) {
        if self.rendered_nodes.len() >= self.config.max_rendered_nodes {
            return;
        }
        let parent_inside = self
            .arena
            .get(idx)
            .and_then(|n| n.parent)
            .and_then(|p| self.arena.get(p))
            .map(|p| p.camera_inside);
        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        let zoom = node.zoom();
        // the equal zoom pass walks nodes the first pass already stamped
        if pass.max_zoom.is_none() {
            node.prev_state = node.state;
        }
        node.state = Some(NodeState::Walkthrough);
        node.clear_neighbors();

        node.camera_inside = false;
        if parent_inside.unwrap_or(true) && is_camera_inside(&node.tile, camera) {
            node.camera_inside = true;
            self.camera_inside = Some(idx);
        }

        let in_frustum = frustum_flags(&node.tile, camera, zoom);
        node.in_frustum = in_frustum;
        let camera_inside = node.camera_inside;

        if in_frustum == 0 && !camera_inside && zoom >= 3 {
            node.state = Some(NodeState::NotRendering);
            return;
        }

        let tile = &node.tile;
        let h = camera.height().abs();
        let horizon_dist = (camera.eye.length_squared() - self.ellipsoid.polar_size_sqr())
            .max(MIN_HORIZON_DIST_SQR * self.config.height_factor);
        let c = &tile.corners;
        let alt_vis = zoom < 2
            || zoom > 19
            || (zoom < 4 && !tile.terrain_ready)
            || [c.sw, c.nw, c.ne, c.se]
                .iter()
                .any(|corner| camera.eye.distance_squared(*corner) < horizon_dist);
        let terrain_ready = tile.terrain_ready;
        let check_zoom = tile.check_zoom(self.terrain.config());
        let bsphere = tile.bsphere;
        let plain_radius = tile.plain_radius;

        if (in_frustum != 0 && (alt_vis || h > 10_000.0)) || camera_inside {
            self.collect_visible_node(idx);
        }

        let max_zoom = pass.max_zoom;
        if zoom < self.config.unconditional_subdivision_zoom {
            self.traverse_nodes(camera, idx, pass);
        } else if terrain_ready
            && match max_zoom {
                None => camera.projected_size(bsphere.center, plain_radius) < self.lod_size,
                Some(max) => zoom == max || !alt_vis,
            }
        {
            if alt_vis {
                if let Some(node) = self.arena.get_mut(idx) {
                    node.tile.pass_ready = true;
                }
                self.render_node(idx, in_frustum, in_frustum == 0, pass);
            } else {
                self.set_state(idx, NodeState::NotRendering);
            }
        } else if terrain_ready
            && check_zoom
            && (max_zoom.is_none()
                || camera.projected_size(bsphere.center, bsphere.radius) > self.config.max_lod_size)
        {
            self.traverse_nodes(
                camera,
                idx,
                TreePass {
                    terrain_hint: Some(idx),
                    ..pass
                },
            );
        } else if alt_vis {
            if let Some(node) = self.arena.get_mut(idx) {
                node.tile.pass_ready = max_zoom.is_some() && terrain_ready;
            }
            self.render_node(idx, in_frustum, in_frustum == 0, pass);
        } else {
            self.set_state(idx, NodeState::NotRendering);
        }
    }

    fn set_state(&mut self, idx: NodeIdx, state: NodeState) {
        if let Some(node) = self.arena.get_mut(idx) {
            node.state = Some(state);
        }
    }

    fn collect_visible_node(&mut self, idx: NodeIdx) {
        if let Some(node) = self.arena.get(idx) {
            self.visible_nodes[node.tile.group as usize].insert(node.id, idx);
        }
    }

    fn traverse_nodes(&mut self, camera: &PlanetCamera, idx: NodeIdx, pass: TreePass) {
        let children = match self.arena.get(idx).map(|n| n.children) {
            Some(Some(children)) => children,
            Some(None) => self.create_children(idx),
            None => return,
        };
        for child in children {
            self.render_tree(camera, child, pass);
        }
    }

    /// Splits a tile in its four quadrants.
    pub(crate) fn create_children(&mut self, idx: NodeIdx) -> [NodeIdx; 4] {
        let Some(node) = self.arena.get(idx) else {
            return [idx; 4];
        };
        if let Some(children) = node.children {
            return children;
        }
        let kind = node.tile.kind;
        let zoom = node.zoom() + 1;
        let extents = quadrant_extents(&node.tile.extent);
        let mut children = [idx; 4];
        for (part, extent) in Quadrant::ALL.into_iter().zip(extents) {
            let tile = Tile::new(kind, zoom, extent, self.terrain.config());
            let id = self.arena.next_id();
            let child = self.arena.insert(Node::new(id, Some(idx), Some(part), tile));
            self.create_bounds(child);
            children[part.index()] = child;
        }
        if let Some(node) = self.arena.get_mut(idx) {
            node.children = Some(children);
        }
        children
    }

    /// Drives the terrain of a tile the walk stopped at and, unless only its
    /// terrain was wanted, queues it for drawing.
    fn render_node(&mut self, idx: NodeIdx, in_frustum: u32, only_terrain: bool, pass: TreePass) {
        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        if !node.tile.terrain_ready {
            if !node.tile.initialized {
                let log2 = node.tile.initialize(self.terrain.config());
                node.side_size_log2 = [log2; 4];
            }
            self.while_terrain_loading(idx, pass.terrain_hint, pass.stop_loading);
            if self.arena.get(idx).map_or(false, |n| !n.tile.plain_processing) {
                self.create_plain_async(idx);
            }
            if self.arena.get(idx).map_or(false, |n| n.tile.plain_ready) && !pass.stop_loading {
                self.load_terrain(idx, false);
            }
        }
        if self.config.light_enabled
            && self.arena.get(idx).map_or(false, |n| !n.tile.normal_map_ready)
        {
            self.while_normal_map_creating(idx);
        }

        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        if only_terrain {
            node.state = Some(NodeState::TerrainOnly);
            return;
        }
        let zoom = node.zoom();
        if !node.camera_inside && self.max_curr_zoom.map_or(true, |m| zoom > m) {
            self.max_curr_zoom = Some(zoom);
        }
        if self.min_curr_zoom.map_or(true, |m| zoom < m) {
            self.min_curr_zoom = Some(zoom);
        }
        self.view_extent.expand(&node.tile.extent_lon_lat);
        self.add_to_render(idx, in_frustum);
    }

    fn add_to_render(&mut self, idx: NodeIdx, in_frustum: u32) {
        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        node.state = Some(NodeState::Rendering);
        let zoom = node.zoom();
        let terrain_ready = node.tile.terrain_ready;

        if self.config.transition_opacity_enabled {
            let arena = &self.arena;
            let at = self
                .rendered_nodes
                .partition_point(|n| arena.get(*n).map_or(true, |n| n.zoom() <= zoom));
            self.rendered_nodes.insert(at, idx);
        } else {
            self.get_rendered_nodes_neighbors(idx);
            self.rendered_nodes.push(idx);
        }
        if !terrain_ready {
            self.render_completed = false;
            self.terrain_completed = false;
        }
        self.push_in_frustum(idx, in_frustum);
    }

    /// State that counts for drawing: a node under anything but a walked
    /// through parent is not drawn.
    pub(crate) fn get_state(&self, idx: NodeIdx) -> Option<NodeState> {
        let node = self.arena.get(idx)?;
        if node.state == Some(NodeState::TerrainOnly) {
            return node.state;
        }
        let mut parent = node.parent;
        while let Some(p) = parent {
            let pn = self.arena.get(p)?;
            if pn.state != Some(NodeState::Walkthrough) {
                return Some(NodeState::NotRendering);
            }
            parent = pn.parent;
        }
        node.state
    }
}

fn is_camera_inside(tile: &Tile, camera: &PlanetCamera) -> bool {
    match tile.kind {
        TileKind::Mercator => {
            camera.lon_lat.lat.abs() <= mercator::MAX_LAT
                && tile.extent.is_inside(&camera.lon_lat_merc)
        }
        _ => tile.extent.is_inside(&camera.lon_lat),
    }
}

/// One bit per frustum the tile is seen in. Deep tiles stop testing once
/// they were found in enough of the nearer frustums.
fn frustum_flags(tile: &Tile, camera: &PlanetCamera, zoom: u32) -> u32 {
    let mut flags = 0;
    if zoom < SPHERE_TEST_ZOOM {
        for (i, frustum) in camera.frustums.iter().enumerate() {
            if frustum.contains_sphere(&tile.bsphere) {
                flags |= 1 << i;
            }
        }
        return flags;
    }
    let n = camera.frustums.len();
    let mut common: u32 = if n >= 2 { 1 << (n - 2) } else { 1 };
    for (i, frustum) in camera.frustums.iter().enumerate() {
        if common == 0 {
            break;
        }
        let seen = if tile.terrain_ready {
            frustum.contains_box(&tile.bbox)
        } else {
            frustum.contains_sphere(&tile.bsphere)
        };
        if seen {
            common >>= 1;
            flags |= 1 << i;
        }
    }
    flags
}

/// NW, NE, SW, SE quarters of an extent.
fn quadrant_extents(extent: &Extent) -> [Extent; 4] {
    let sw = extent.south_west;
    let ne = extent.north_east;
    let c = extent.center();
    let hx = extent.width() * 0.5;
    let hy = extent.height() * 0.5;
    [
        Extent::new(
            LonLat::from_degrees(sw.lon, sw.lat + hy),
            LonLat::from_degrees(sw.lon + hx, ne.lat),
        ),
        Extent::new(c, ne),
        Extent::new(sw, c),
        Extent::new(
            LonLat::from_degrees(sw.lon + hx, sw.lat),
            LonLat::from_degrees(ne.lon, sw.lat + hy),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use houtu_scene::BoundingSphere;

    use super::*;
    use crate::{config::QuadForestConfig, forest::test_support::*, tile::TileGroup};

    fn assert_close(a: &Extent, b: &Extent) {
        let d = [
            a.south_west.lon - b.south_west.lon,
            a.south_west.lat - b.south_west.lat,
            a.north_east.lon - b.north_east.lon,
            a.north_east.lat - b.north_east.lat,
        ];
        assert!(d.iter().all(|d| d.abs() < 1e-6), "{:?} != {:?}", a, b);
    }

    #[test]
    fn quarters_cover_the_parent() {
        let parent = mercator::get_tile_extent(3, 5, 4);
        let [nw, ne, sw, se] = quadrant_extents(&parent);
        assert_close(&nw, &mercator::get_tile_extent(6, 10, 5));
        assert_close(&ne, &mercator::get_tile_extent(7, 10, 5));
        assert_close(&sw, &mercator::get_tile_extent(6, 11, 5));
        assert_close(&se, &mercator::get_tile_extent(7, 11, 5));
    }

    #[test]
    fn children_get_their_indexes() {
        let mut forest = earth(QuadForestConfig::default());
        let root = forest.roots()[1];
        let children = forest.create_children(root);
        assert_eq!(forest.create_children(root), children);
        for (part, child) in Quadrant::ALL.into_iter().zip(children) {
            let node = forest.node(child).unwrap();
            assert_eq!(node.part, Some(part));
            assert_eq!(node.parent, Some(root));
            assert_eq!(node.tile.group, TileGroup::North);
            assert_eq!(
                (node.tile.x, node.tile.y),
                (part.index() as u32 & 1, part.index() as u32 >> 1)
            );
        }
        assert_eq!(forest.stats().created_nodes, 7);
    }

    #[test]
    fn state_of_a_node_under_a_drawn_parent() {
        let mut forest = earth(QuadForestConfig::default());
        let root = forest.roots()[0];
        let children = forest.create_children(root);
        forest.arena.get_mut(root).unwrap().state = Some(NodeState::Rendering);
        forest.arena.get_mut(children[0]).unwrap().state = Some(NodeState::Rendering);
        forest.arena.get_mut(children[1]).unwrap().state = Some(NodeState::TerrainOnly);
        assert_eq!(forest.get_state(children[0]), Some(NodeState::NotRendering));
        assert_eq!(forest.get_state(children[1]), Some(NodeState::TerrainOnly));

        forest.arena.get_mut(root).unwrap().state = Some(NodeState::Walkthrough);
        assert_eq!(forest.get_state(children[0]), Some(NodeState::Rendering));
    }

    #[test]
    fn equal_zoom_walk_keeps_last_frame_states() {
        let mut forest = earth(QuadForestConfig::default());
        let cam = camera(10.0, 20.0, 2_000_000.0);
        let idx = descend(
            &mut forest,
            &[Quadrant::NorthWest, Quadrant::NorthEast, Quadrant::SouthEast],
        );
        let node = forest.arena.get_mut(idx).unwrap();
        node.prev_state = Some(NodeState::NotRendering);
        node.state = Some(NodeState::Rendering);

        let equal_zoom = TreePass {
            max_zoom: Some(5),
            ..TreePass::default()
        };
        forest.render_tree(&cam, idx, equal_zoom);
        assert_eq!(forest.node(idx).unwrap().prev_state, Some(NodeState::NotRendering));

        let walked = forest.node(idx).unwrap().state;
        forest.render_tree(&cam, idx, TreePass::default());
        assert_eq!(forest.node(idx).unwrap().prev_state, walked);
    }

    #[test]
    fn one_frustum_still_flags_deep_tiles() {
        let cam = {
            let mut c = camera(10.0, 20.0, 20_000.0);
            c.frustums.truncate(1);
            c
        };
        let forest = earth(QuadForestConfig::default());
        let mut tile = forest.node(forest.roots()[0]).unwrap().tile.clone();
        tile.bsphere = BoundingSphere::new(cam.eye + cam.direction * 50.0, 10.0);
        assert_eq!(frustum_flags(&tile, &cam, 8), 1);
        assert_eq!(frustum_flags(&tile, &camera(10.0, 20.0, 20_000.0), 8), 1);
    }

    #[test]
    fn rendered_tiles_are_sorted_by_zoom_when_fading() {
        let config = QuadForestConfig {
            transition_opacity_enabled: true,
            ..QuadForestConfig::default()
        };
        let mut forest = earth(config);
        let cam = camera(10.0, 20.0, 300_000.0);
        settle(&mut forest, &cam);
        let zooms: Vec<u32> = forest
            .rendered_nodes()
            .iter()
            .map(|idx| forest.node(*idx).unwrap().zoom())
            .collect();
        assert!(zooms.windows(2).all(|w| w[0] <= w[1]), "{:?}", zooms);
    }

    #[test]
    fn frustum_lists_hold_rendered_tiles_only() {
        let mut forest = earth(QuadForestConfig::default());
        let cam = camera(-70.0, -30.0, 2_000_000.0);
        settle(&mut forest, &cam);
        assert!(!forest.rendered_nodes().is_empty());
        let total: usize = (0..cam.frustum_count())
            .map(|i| forest.rendered_nodes_in_frustum(i).len())
            .sum();
        assert!(total >= forest.rendered_nodes().len());
        for i in 0..cam.frustum_count() {
            for idx in forest.rendered_nodes_in_frustum(i) {
                assert!(forest.rendered_nodes().contains(idx));
                assert_ne!(forest.node(*idx).unwrap().in_frustum & (1 << i), 0);
            }
        }
        let view = forest.view_extent();
        assert!(view.is_inside(&LonLat::from_degrees(-70.0, -30.0)));
    }
}
