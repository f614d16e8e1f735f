//! Which drawn tiles touch, on what side, and at which edge resolution.
use houtu_scene::math::log2_u32;

use crate::{
    forest::QuadForest,
    node::NodeIdx,
    quad::{Quadrant, Side},
    tile::{Tile, TileGroup},
};

/// Degrees. Mercator edges come back from meters with rounding noise.
const EDGE_EPSILON: f64 = 1e-7;

fn same_edge(a: f64, b: f64) -> bool {
    (a - b).abs() < EDGE_EPSILON
}

fn span_inside(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> bool {
    (a_min > b_min - EDGE_EPSILON && a_max < b_max + EDGE_EPSILON)
        || (b_min > a_min - EDGE_EPSILON && b_max < a_max + EDGE_EPSILON)
}

/// Side of `a` that `b` lies against, if they share an edge.
pub fn get_common_side(a: &Tile, b: &Tile) -> Option<Side> {
    let (a_sw, a_ne) = (a.extent_lon_lat.south_west, a.extent_lon_lat.north_east);
    let (b_sw, b_ne) = (b.extent_lon_lat.south_west, b.extent_lon_lat.north_east);
    let lat_inside = span_inside(a_sw.lat, a_ne.lat, b_sw.lat, b_ne.lat);
    let lon_inside = span_inside(a_sw.lon, a_ne.lon, b_sw.lon, b_ne.lon);

    if a.group == b.group {
        if a.zoom == b.zoom {
            return a.get_neighbor_side(b);
        }
        let a_last = (1u64 << a.zoom) - 1;
        let b_last = (1u64 << b.zoom) - 1;
        if same_edge(a_ne.lon, b_sw.lon) && lat_inside {
            return Some(Side::East);
        } else if same_edge(a_sw.lon, b_ne.lon) && lat_inside {
            return Some(Side::West);
        } else if same_edge(a_ne.lat, b_sw.lat) && lon_inside {
            return Some(Side::North);
        } else if same_edge(a_sw.lat, b_ne.lat) && lon_inside {
            return Some(Side::South);
        } else if b.x == 0 && u64::from(a.x) == a_last && lat_inside {
            return Some(Side::East);
        } else if a.x == 0 && u64::from(b.x) == b_last && lat_inside {
            return Some(Side::West);
        }
        return None;
    }

    if !lon_inside {
        return None;
    }
    let a_last = (1u64 << a.zoom) - 1;
    let b_last = (1u64 << b.zoom) - 1;
    match (a.group, b.group) {
        (TileGroup::Common, TileGroup::North) | (TileGroup::South, TileGroup::Common)
            if a.y == 0 && u64::from(b.y) == b_last =>
        {
            Some(Side::North)
        }
        (TileGroup::Common, TileGroup::South) | (TileGroup::North, TileGroup::Common)
            if u64::from(a.y) == a_last && b.y == 0 =>
        {
            Some(Side::South)
        }
        _ => None,
    }
}

impl QuadForest {
    pub(crate) fn common_side(&self, a: NodeIdx, b: NodeIdx) -> Option<Side> {
        get_common_side(&self.arena.get(a)?.tile, &self.arena.get(b)?.tile)
    }

    /// Links `a` and `b` across `side` of `a`. The first link on a side
    /// decides the edge resolution both index strips use there.
    pub(crate) fn apply_neighbor(&mut self, a: NodeIdx, b: NodeIdx, side: Side) {
        let op = side.opposite();
        let Some((na, nb)) = self.arena.pair_mut(a, b) else {
            return;
        };
        if na.neighbors[side.index()].is_empty() || nb.neighbors[op.index()].is_empty() {
            let a_gs = f64::from(na.tile.grid_size);
            let b_gs = f64::from(nb.tile.grid_size);
            let dz = i32::try_from(nb.zoom()).unwrap_or(i32::MAX)
                - i32::try_from(na.zoom()).unwrap_or(i32::MAX);
            let ld = a_gs / (b_gs * 2f64.powi(dz));
            let (cs, opcs) = if ld > 1.0 {
                ((a_gs / ld).ceil(), b_gs)
            } else if ld < 1.0 {
                (a_gs, (b_gs * ld).ceil())
            } else {
                (a_gs, b_gs)
            };
            na.side_size_log2[side.index()] = log2_u32(cs.max(1.0) as u32);
            nb.side_size_log2[op.index()] = log2_u32(opcs.max(1.0) as u32);
        }
        na.neighbors[side.index()].push(b);
        nb.neighbors[op.index()].push(a);
    }

    /// Links a tile about to be drawn with every drawn tile it touches.
    pub(crate) fn get_rendered_nodes_neighbors(&mut self, idx: NodeIdx) {
        for i in (0..self.rendered_nodes.len()).rev() {
            let other = self.rendered_nodes[i];
            if other == idx {
                continue;
            }
            if let Some(side) = self.common_side(idx, other) {
                self.apply_neighbor(idx, other, side);
            }
        }
    }

    /// Node of the same zoom on `side`, or the deepest existing one on the
    /// way down to it.
    pub fn get_equal_neighbor(&self, idx: NodeIdx, side: Side) -> Option<NodeIdx> {
        let node = self.arena.get(idx)?;
        let part = node.part?;
        let parent = node.parent?;
        if let Some(sibling) = part.neighbour(side) {
            return Some(self.arena.get(parent)?.children?[sibling.index()]);
        }

        let mut path: Vec<Quadrant> = vec![part];
        let mut pn = parent;
        let mut found = None;
        while let Some(p) = self.arena.get(pn) {
            let (Some(p_part), Some(p_parent)) = (p.part, p.parent) else {
                break;
            };
            if let Some(sibling) = p_part.neighbour(side) {
                found = Some(self.arena.get(p_parent)?.children?[sibling.index()]);
                break;
            }
            path.push(p_part);
            pn = p_parent;
        }

        let mut n = found?;
        let op = side.opposite();
        for part in path.iter().rev() {
            match self.arena.get(n)?.children {
                Some(children) => n = children[part.mirrored(op).index()],
                None => break,
            }
        }
        Some(n)
    }

    /// Where along its `side` the edge of a tile starts on the matching edge
    /// of its ancestor at `neighbour_zoom`, as a fraction of that edge.
    pub(crate) fn get_offset_opposite_neighbour_side(
        &self,
        idx: NodeIdx,
        neighbour_zoom: u32,
        side: Side,
    ) -> f64 {
        let mut offset = 0.0;
        let mut pn = idx;
        while let Some(node) = self.arena.get(pn) {
            if node.zoom() <= neighbour_zoom {
                break;
            }
            let (Some(part), Some(parent)) = (node.part, node.parent) else {
                break;
            };
            offset += f64::from(part.offset_along(side))
                / f64::from(1u32 << (node.zoom() - neighbour_zoom));
            pn = parent;
        }
        offset
    }
}

#[cfg(test)]
mod tests {
    use houtu_scene::mercator;

    use super::*;
    use crate::{
        config::{QuadForestConfig, TerrainConfig},
        forest::test_support::*,
        quad::Quadrant::*,
        strategy::{north_cap_extent, south_cap_extent},
        tile::TileKind,
    };

    fn merc(x: u32, y: u32, z: u32) -> Tile {
        Tile::new(
            TileKind::Mercator,
            z,
            mercator::get_tile_extent(x, y, z),
            &TerrainConfig::empty(),
        )
    }

    fn cap(extent: houtu_scene::Extent, x: u32, y: u32, z: u32) -> Tile {
        Tile::new(
            TileKind::PolarCap,
            z,
            extent.tile_cell(x, y, z),
            &TerrainConfig::empty(),
        )
    }

    fn assert_mutual(a: &Tile, b: &Tile, side: Option<Side>) {
        assert_eq!(get_common_side(a, b), side);
        assert_eq!(get_common_side(b, a), side.map(Side::opposite));
    }

    #[test]
    fn same_zoom_sides() {
        assert_mutual(&merc(2, 2, 3), &merc(3, 2, 3), Some(Side::East));
        assert_mutual(&merc(2, 2, 3), &merc(2, 1, 3), Some(Side::North));
        assert_mutual(&merc(0, 2, 3), &merc(7, 2, 3), Some(Side::West));
        assert_mutual(&merc(2, 2, 3), &merc(4, 2, 3), None);
        assert_mutual(&merc(2, 2, 3), &merc(3, 3, 3), None);
    }

    #[test]
    fn mixed_zoom_sides() {
        assert_mutual(&merc(4, 4, 4), &merc(1, 2, 3), Some(Side::West));
        assert_mutual(&merc(5, 3, 4), &merc(2, 2, 3), Some(Side::South));
        assert_mutual(&merc(15, 4, 4), &merc(0, 2, 3), Some(Side::East));
        assert_mutual(&merc(6, 6, 4), &merc(1, 1, 3), None);
    }

    #[test]
    fn across_the_cap_border() {
        let north = cap(north_cap_extent(), 1, 1, 1);
        assert_mutual(&merc(2, 0, 2), &north, Some(Side::North));
        let south = cap(south_cap_extent(), 0, 0, 1);
        assert_mutual(&merc(0, 3, 2), &south, Some(Side::South));
        assert_mutual(&merc(3, 3, 2), &south, None);
    }

    #[test]
    fn first_link_decides_the_edge_resolution() {
        let mut forest = earth(QuadForestConfig::default());
        let a = descend(&mut forest, &[NorthWest, SouthEast, NorthWest]);
        let b = descend(&mut forest, &[NorthWest, SouthEast, NorthEast]);
        let coarse = descend(&mut forest, &[NorthWest, SouthWest]);
        forest.arena.get_mut(a).unwrap().tile.grid_size = 8;
        forest.arena.get_mut(coarse).unwrap().tile.grid_size = 8;

        // a at zoom 3 beside coarse at zoom 2: a's edge is half of coarse's
        assert_eq!(forest.common_side(a, coarse), Some(Side::West));
        forest.apply_neighbor(a, coarse, Side::West);
        assert_eq!(forest.node(a).unwrap().side_size_log2[Side::West.index()], 2);
        assert_eq!(forest.node(coarse).unwrap().side_size_log2[Side::East.index()], 3);
        assert_eq!(forest.node(a).unwrap().neighbors[Side::West.index()], vec![coarse]);

        forest.apply_neighbor(a, b, Side::East);
        assert_eq!(forest.node(b).unwrap().neighbors[Side::West.index()], vec![a]);
    }

    #[test]
    fn equal_neighbor_crosses_parents() {
        let mut forest = earth(QuadForestConfig::default());
        let a = descend(&mut forest, &[NorthWest, NorthEast, SouthEast]);
        let sibling = descend(&mut forest, &[NorthWest, NorthEast, SouthWest]);
        let across = descend(&mut forest, &[NorthEast, NorthWest, SouthWest]);
        assert_eq!(forest.get_equal_neighbor(a, Side::West), Some(sibling));
        assert_eq!(forest.get_equal_neighbor(a, Side::East), Some(across));

        // the branch below stops early: the deepest node is returned
        let shallow = descend(&mut forest, &[SouthWest]);
        let b = descend(&mut forest, &[NorthWest, SouthWest, SouthWest]);
        assert_eq!(forest.get_equal_neighbor(b, Side::South), Some(shallow));
        let tile = &forest.node(across).unwrap().tile;
        let me = &forest.node(a).unwrap().tile;
        assert_eq!(get_common_side(me, tile), Some(Side::East));
    }

    #[test]
    fn offset_along_the_coarser_edge() {
        let mut forest = earth(QuadForestConfig::default());
        let a = descend(&mut forest, &[NorthWest, NorthEast, SouthEast]);
        // a's north edge is the last quarter of its zoom 1 ancestor's
        assert_eq!(forest.get_offset_opposite_neighbour_side(a, 1, Side::North), 0.75);
        assert_eq!(forest.get_offset_opposite_neighbour_side(a, 1, Side::West), 0.25);
        assert_eq!(forest.get_offset_opposite_neighbour_side(a, 3, Side::West), 0.0);
    }
}
