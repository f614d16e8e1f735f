//! Seam removal: shared edges take the neighbour's vertices, shared
//! normals are averaged.
use std::sync::Arc;

use bevy::log::debug;

use crate::{forest::QuadForest, node::NodeIdx, quad::Side};

/// Vertex of a `grid_size` grid lying `k` steps along `side`, counted west
/// to east on rows and north to south on columns.
pub fn edge_vertex(side: Side, k: usize, grid_size: usize) -> usize {
    let row = grid_size + 1;
    match side {
        Side::North => k,
        Side::East => row * k + grid_size,
        Side::South => row * grid_size + k,
        Side::West => row * k,
    }
}

impl QuadForest {
    /// Copies the edge of every coarser or equal drawn neighbour into this
    /// tile, once per neighbour surface.
    pub(crate) fn equalize(&mut self, idx: NodeIdx) {
        let min_zoom = self.config.min_equalize_zoom;
        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        if node.zoom() < min_zoom || node.tile.grid_size < 2 {
            return;
        }
        node.tile.ready_to_engage = true;
        for side in Side::ALL {
            self.equalize_side(idx, side);
        }
    }

    fn equalize_side(&mut self, idx: NodeIdx, side: Side) {
        let op = side.opposite();
        let Some(node) = self.arena.get(idx) else {
            return;
        };
        let Some(&n) = node.neighbors[side.index()].first() else {
            return;
        };
        let Some(neighbour) = self.arena.get(n) else {
            return;
        };
        let zoom = node.zoom();
        let n_zoom = neighbour.zoom();
        if zoom < n_zoom
            || node.equalized_side_with_node_id[side.index()]
                == neighbour.equalized_side_with_node_id[op.index()]
        {
            return;
        }
        let offset = self.get_offset_opposite_neighbour_side(idx, n_zoom, side);

        let Some((a, b)) = self.arena.pair_mut(idx, n) else {
            return;
        };
        let (Some(verts), Some(n_verts)) = (a.tile.terrain_vertices.as_mut(), b.tile.terrain_vertices.as_ref())
        else {
            return;
        };
        let gs = verts.grid_size() as usize;
        let n_gs = n_verts.grid_size() as usize;
        if gs == 0 || n_gs == 0 {
            return;
        }
        a.equalized_side_with_node_id[side.index()] = b.equalized_side_with_node_id[op.index()];

        let dz = 0.5f64.powi(i32::try_from(zoom - n_zoom).unwrap_or(i32::MAX));
        let inc = (gs as f64 / (n_gs as f64 * dz)).max(1.0);
        let n_inc = (n_gs as f64 * dz / gs as f64).max(1.0);
        let own_len = verts.len() / 3;
        let n_len = n_verts.len() / 3;

        let mut k = 0.0;
        let mut nk = offset * n_gs as f64;
        while k < (gs + 1) as f64 {
            if k.fract() == 0.0 && nk.fract() == 0.0 && nk <= n_gs as f64 {
                let vi = edge_vertex(side, k as usize, gs);
                let ni = edge_vertex(op, nk as usize, n_gs);
                if vi < own_len && ni < n_len {
                    verts.copy_vertex_from(vi, n_verts, ni);
                }
            }
            k += inc;
            nk += n_inc;
        }
        debug!(
            "equalized {} {:?} edge with {}",
            a.id, side, b.id
        );
    }

    /// Averages this tile's edge normals with its same-zoom neighbour on
    /// `side` and requeues the neighbour so its map picks the edge up.
    pub(crate) fn normal_map_edge_equalize(&mut self, idx: NodeIdx, side: Side) {
        let max_zoom = self.terrain.config().max_zoom;
        let op = side.opposite();
        let Some(node) = self.arena.get(idx) else {
            return;
        };
        let mut n = node.neighbors[side.index()].first().copied();
        if node.zoom() == max_zoom && !node.has_neighbors() {
            n = self.get_equal_neighbor(idx, side);
        }
        let Some(n) = n else {
            return;
        };
        let Some(b_ref) = self.arena.tile_ref(n) else {
            return;
        };
        let Some((s, b)) = self.arena.pair_mut(idx, n) else {
            return;
        };
        let (s_zoom, b_zoom) = (s.zoom(), b.zoom());
        if !b.tile.terrain_ready
            || !b.tile.terrain_exists
            || b_zoom > max_zoom
            || s.tile.applied_neighbors_zoom[side.index()] == b_zoom
        {
            return;
        }
        s.tile.applied_neighbors_zoom[side.index()] = b_zoom;

        let (Some(seg_a), Some(seg_b)) = (s.tile.normal_map_normals.as_mut(), b.tile.normal_map_normals.as_mut())
        else {
            return;
        };
        if s_zoom != b_zoom || seg_a.len() != seg_b.len() {
            return;
        }
        let seg_a = Arc::make_mut(seg_a);
        let seg_b = Arc::make_mut(seg_b);
        let s_gs = ((seg_a.len() / 3) as f64).sqrt() as usize;
        if s_gs == 0 {
            return;
        }
        let last = s_gs - 1;
        for k in 0..s_gs {
            let ia = edge_vertex(side, k, last) * 3;
            let ib = edge_vertex(op, k, last) * 3;
            let nx = seg_a[ia] + seg_b[ib];
            let ny = seg_a[ia + 1] + seg_b[ib + 1];
            let nz = seg_a[ia + 2] + seg_b[ib + 2];
            let len = (nx * nx + ny * ny + nz * nz).sqrt();
            if len == 0.0 {
                continue;
            }
            let q = 1.0 / len;
            for (c, v) in [nx, ny, nz].into_iter().enumerate() {
                seg_a[ia + c] = v * q;
                seg_b[ib + c] = v * q;
            }
        }

        if !b.tile.in_the_queue && b.tile.applied_neighbors_zoom[op.index()] != s_zoom {
            b.tile.applied_neighbors_zoom[op.index()] = s_zoom;
            self.normal_maps.queue(b_ref, &mut b.tile);
        }
    }
}

#[cfg(test)]
mod tests {
    use houtu_scene::{math::HighLowVertices, mercator};

    use super::*;
    use crate::{
        config::QuadForestConfig,
        forest::test_support::*,
        node::Node,
        quad::Quadrant,
        tile::{Tile, TileKind},
    };

    fn insert(
        forest: &mut QuadForest,
        (x, y, z): (u32, u32, u32),
        parent: Option<(NodeIdx, Quadrant)>,
        grid_size: usize,
        seed: f64,
    ) -> NodeIdx {
        let tile = Tile::new(
            TileKind::Mercator,
            z,
            mercator::get_tile_extent(x, y, z),
            forest.terrain.config(),
        );
        let id = forest.arena.next_id();
        let mut node = Node::new(id, parent.map(|p| p.0), parent.map(|p| p.1), tile);
        let count = (grid_size + 1) * (grid_size + 1);
        let verts = (0..count * 3).map(|i| seed + i as f64).collect();
        node.tile.terrain_vertices = Some(HighLowVertices::from_vertices(verts));
        node.tile.grid_size = grid_size as u32;
        forest.arena.insert(node)
    }

    fn link(forest: &mut QuadForest, a: NodeIdx, b: NodeIdx, side: Side) {
        forest.arena.get_mut(a).unwrap().neighbors[side.index()].push(b);
        forest.arena.get_mut(b).unwrap().neighbors[side.opposite().index()].push(a);
    }

    fn vertex(forest: &QuadForest, idx: NodeIdx, v: usize) -> bevy::math::DVec3 {
        let node = forest.node(idx).unwrap();
        node.tile.terrain_vertices.as_ref().unwrap().get(v).unwrap()
    }

    #[test]
    fn edge_vertices_walk_the_border() {
        assert_eq!(edge_vertex(Side::North, 3, 4), 3);
        assert_eq!(edge_vertex(Side::South, 0, 4), 20);
        assert_eq!(edge_vertex(Side::East, 1, 4), 9);
        assert_eq!(edge_vertex(Side::West, 4, 4), 20);
    }

    #[test]
    fn finer_tile_takes_the_coarser_edge() {
        let mut forest = earth(QuadForestConfig {
            min_equalize_zoom: 0,
            ..Default::default()
        });
        let coarse = insert(&mut forest, (10, 10, 5), None, 4, 0.0);
        let parent = insert(&mut forest, (10, 11, 5), None, 4, 1000.0);
        let fine = insert(
            &mut forest,
            (21, 22, 6),
            Some((parent, Quadrant::NorthEast)),
            4,
            5000.0,
        );
        link(&mut forest, fine, coarse, Side::North);

        forest.equalize(fine);
        // the eastern half of the coarse south row, every second fine vertex
        for j in 0..3 {
            assert_eq!(vertex(&forest, fine, 2 * j), vertex(&forest, coarse, 22 + j));
        }
        assert_ne!(vertex(&forest, fine, 1), vertex(&forest, coarse, 22));
        assert!(forest.node(fine).unwrap().tile.ready_to_engage);
        let coarse_id = forest.node(coarse).unwrap().id;
        assert_eq!(
            forest.node(fine).unwrap().equalized_side_with_node_id[Side::North.index()],
            coarse_id
        );

        // nothing changed on the other side: the edge is left alone
        let before = vertex(&forest, fine, 0);
        forest
            .arena
            .get_mut(coarse)
            .unwrap()
            .tile
            .terrain_vertices
            .as_mut()
            .unwrap()
            .set(22, bevy::math::DVec3::ZERO);
        forest.equalize(fine);
        assert_eq!(vertex(&forest, fine, 0), before);

        // the coarse tile never takes a finer edge
        let coarse_before = vertex(&forest, coarse, 23);
        forest.equalize(coarse);
        assert_eq!(vertex(&forest, coarse, 23), coarse_before);
    }

    #[test]
    fn shallow_tiles_are_left_alone() {
        let mut forest = earth(QuadForestConfig::default());
        let a = insert(&mut forest, (10, 10, 5), None, 4, 0.0);
        let b = insert(&mut forest, (10, 11, 5), None, 4, 1000.0);
        link(&mut forest, b, a, Side::North);
        forest.equalize(b);
        assert_ne!(vertex(&forest, b, 0), vertex(&forest, a, 20));
        assert!(!forest.node(b).unwrap().tile.ready_to_engage);
    }

    #[test]
    fn same_zoom_normals_meet_halfway() {
        let mut forest = earth(QuadForestConfig::default());
        let a = insert(&mut forest, (10, 10, 5), None, 2, 0.0);
        let b = insert(&mut forest, (11, 10, 5), None, 2, 0.0);
        link(&mut forest, a, b, Side::East);
        for (idx, n) in [(a, [1.0, 0.0, 0.0]), (b, [0.0, 1.0, 0.0])] {
            let tile = &mut forest.arena.get_mut(idx).unwrap().tile;
            tile.terrain_ready = true;
            tile.terrain_exists = true;
            tile.normal_map_normals = Some(Arc::new(n.repeat(9)));
        }

        forest.normal_map_edge_equalize(a, Side::East);
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let na = forest.node(a).unwrap().tile.normal_map_normals.clone().unwrap();
        let nb = forest.node(b).unwrap().tile.normal_map_normals.clone().unwrap();
        // east column of a, west column of b
        for k in 0..3 {
            let ia = (k * 3 + 2) * 3;
            let ib = (k * 3) * 3;
            assert!((na[ia] - half).abs() < 1e-6);
            assert!((na[ia + 1] - half).abs() < 1e-6);
            assert_eq!(&na[ia..ia + 3], &nb[ib..ib + 3]);
        }
        assert_eq!(na[0], 1.0);
        assert_eq!(forest.node(a).unwrap().tile.applied_neighbors_zoom[Side::East.index()], 5);
        assert!(forest.node(b).unwrap().tile.in_the_queue);
        assert_eq!(forest.normal_maps.len(), 1);

        // applied once per neighbour zoom
        forest.normal_map_edge_equalize(a, Side::East);
        assert_eq!(forest.normal_maps.len(), 1);
    }
}
