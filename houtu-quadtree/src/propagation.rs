//! Bounds and surfaces a tile borrows from the nearest ancestor that has
//! terrain, until its own arrives.
use std::sync::Arc;

use bevy::math::DVec3;
use houtu_scene::{math::HighLowVertices, BoundingSphere, Box3};

use crate::{
    forest::QuadForest,
    grid::{sub_array_f32, sub_vertices_with_bounds, BoundedWindow},
    node::{NodeId, NodeIdx},
    tile::TileCorners,
};

/// NW, NE, SW, SE corners of a one-cell patch, in cell units.
const PATCH_ORDER: [(f64, f64); 4] = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];

/// One cell of a coarser grid, split in two triangles along its NE-SW diagonal.
struct Cell {
    lt: DVec3,
    rb: DVec3,
    vn: DVec3,
    vw: DVec3,
    ve: DVec3,
    vs: DVec3,
}

impl Cell {
    fn from_grid(vertices: &HighLowVertices, grid_size: u32, i0: usize, j0: usize) -> Option<Self> {
        let row = grid_size as usize + 1;
        let lt = vertices.get(i0 * row + j0)?;
        let ne = vertices.get(i0 * row + j0 + 1)?;
        let sw = vertices.get((i0 + 1) * row + j0)?;
        let rb = vertices.get((i0 + 1) * row + j0 + 1)?;
        Some(Cell {
            lt,
            rb,
            vn: ne - lt,
            vw: sw - lt,
            ve: ne - rb,
            vs: sw - rb,
        })
    }

    /// Point `x` cells east and `y` cells south of the north west corner.
    fn point(&self, x: f64, y: f64) -> DVec3 {
        if x + y < 1.0 {
            self.lt + self.vn * x + self.vw * y
        } else {
            self.rb + self.vs * (1.0 - x) + self.ve * (1.0 - y)
        }
    }
}

/// Where a tile sits inside an ancestor, in tiles of its own zoom.
#[derive(Debug, Clone, Copy)]
struct Offset {
    dz2: f64,
    x: f64,
    y: f64,
}

impl Offset {
    fn of(zoom: u32, x: u32, y: u32, ancestor_zoom: u32, ancestor_x: u32, ancestor_y: u32) -> Self {
        let dz2 = (1u64 << zoom.saturating_sub(ancestor_zoom)) as f64;
        Offset {
            dz2,
            x: f64::from(x) - f64::from(ancestor_x) * dz2,
            y: f64::from(y) - f64::from(ancestor_y) * dz2,
        }
    }
}

/// Surface cut out of an ancestor's grid.
struct BorrowedSurface {
    grid_size: u32,
    window: BoundedWindow,
}

/// Cuts the part of a `grid_size` grid under a tile at `offset`.
fn borrow_surface(
    vertices: &HighLowVertices,
    no_data: Option<&[u8]>,
    grid_size: u32,
    offset: Offset,
) -> Option<BorrowedSurface> {
    let gs = f64::from(grid_size) / offset.dz2;
    if gs >= 1.0 {
        let size = gs as usize;
        let window = sub_vertices_with_bounds(
            vertices,
            no_data,
            grid_size as usize,
            size * offset.y as usize,
            size * offset.x as usize,
            size,
        )?;
        return Some(BorrowedSurface {
            grid_size: size as u32,
            window,
        });
    }

    let i0 = (gs * offset.y).floor();
    let j0 = (gs * offset.x).floor();
    let cell = Cell::from_grid(vertices, grid_size, i0 as usize, j0 as usize)?;
    let inside = 1.0 / gs;
    let t_i0 = offset.y - inside * i0;
    let t_j0 = offset.x - inside * j0;

    let mut patch = HighLowVertices::with_len(PATCH_ORDER.len() * 3);
    let mut bounds = Box3::empty();
    for (k, (x, y)) in PATCH_ORDER.iter().enumerate() {
        let p = cell.point((x + t_j0) * gs, (y + t_i0) * gs);
        patch.set(k, p);
        bounds.expand_point(p);
    }
    Some(BorrowedSurface {
        grid_size: 1,
        window: BoundedWindow {
            vertices: patch,
            no_data: None,
            bounds,
        },
    })
}

impl QuadForest {
    /// `idx` itself or its nearest ancestor with terrain, else the root.
    pub(crate) fn nearest_terrain_ready(&self, idx: NodeIdx) -> NodeIdx {
        let mut pn = idx;
        while let Some(node) = self.arena.get(pn) {
            match node.parent {
                Some(parent) if !node.tile.terrain_ready => pn = parent,
                _ => break,
            }
        }
        pn
    }

    pub(crate) fn create_bounds(&mut self, idx: NodeIdx) {
        let min_zoom = self.terrain.config().min_zoom;
        let Some(zoom) = self.arena.get(idx).map(|n| n.zoom()) else {
            return;
        };
        if zoom < min_zoom.max(1) {
            if let Some(node) = self.arena.get_mut(idx) {
                node.tile.create_bounds_by_extent(&self.ellipsoid);
            }
        } else {
            self.create_bounds_by_parent(idx);
        }
        if let Some(node) = self.arena.get_mut(idx) {
            let normal = node.tile.bsphere.center.normalize_or_zero();
            if normal != DVec3::ZERO {
                node.tile.center_normal = normal;
            }
        }
    }

    /// Bounds from the terrain of the nearest ready ancestor, or from the
    /// extent when no such ancestor is deep enough.
    fn create_bounds_by_parent(&mut self, idx: NodeIdx) {
        let min_zoom = self.terrain.config().min_zoom;
        let pn = self.nearest_terrain_ready(idx);
        let bounds = match (self.arena.get(idx), self.arena.get(pn)) {
            (Some(node), Some(p)) if p.tile.terrain_ready && p.zoom() >= min_zoom => {
                let t = &node.tile;
                let pt = &p.tile;
                let offset = Offset::of(t.zoom, t.x, t.y, pt.zoom, pt.x, pt.y);
                pt.terrain_vertices
                    .as_ref()
                    .and_then(|verts| parent_bounds(verts, pt.grid_size, offset, pt.bsphere, pt.bbox))
            }
            _ => None,
        };
        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        match bounds {
            Some(ParentBounds::Shared {
                corners,
                bsphere,
                bbox,
            }) => {
                node.tile.corners = corners;
                node.tile.bsphere = bsphere;
                node.tile.bbox = bbox;
            }
            Some(ParentBounds::Patch { corners, bbox }) => {
                node.tile.corners = corners;
                node.tile.set_bounding_volume_box(bbox);
            }
            None => node.tile.create_bounds_by_extent(&self.ellipsoid),
        }
    }

    /// Shows the nearest terrain-ready ancestor's surface on a tile that
    /// has none of its own yet.
    pub(crate) fn while_terrain_loading(
        &mut self,
        idx: NodeIdx,
        hint: Option<NodeIdx>,
        stop_loading: bool,
    ) {
        let pn = match hint {
            Some(h) if self.arena.get(h).map_or(false, |n| n.tile.terrain_ready) => h,
            _ => self.nearest_terrain_ready(idx),
        };
        let (Some(node), Some(p)) = (self.arena.get(idx), self.arena.get(pn)) else {
            return;
        };
        if !p.tile.terrain_ready || node.applied_terrain_node_id == Some(p.id) {
            return;
        }

        let t = &node.tile;
        let pt = &p.tile;
        let offset = Offset::of(t.zoom, t.x, t.y, pt.zoom, pt.x, pt.y);
        let gs = f64::from(pt.grid_size) / offset.dz2;
        let gs_ext = f64::from(pt.file_grid_size) / offset.dz2;
        let surface = match (&pt.terrain_vertices, &pt.normal_map_vertices) {
            (Some(verts), _) if gs >= 1.0 => {
                borrow_surface(verts, pt.no_data.as_deref(), pt.grid_size, offset)
            }
            (_, Some(verts)) if gs_ext >= 1.0 && pt.terrain_exists => {
                borrow_surface(verts, None, pt.file_grid_size, offset)
            }
            (Some(verts), _) => borrow_surface(verts, None, pt.grid_size, offset),
            _ => None,
        };
        let Some(surface) = surface else {
            return;
        };

        let p_id = p.id;
        let p_zoom = pt.zoom;
        let p_plain_radius = pt.plain_radius;
        let p_exists = pt.terrain_exists;
        let p_normals = pt.normal_map_normals.clone();
        let max_zoom = self.terrain.config().max_zoom;

        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        let own_id = node.id;
        node.applied_terrain_node_id = Some(p_id);
        node.equalized_side_with_node_id = [p_id; 4];
        let tile = &mut node.tile;
        tile.ready_to_engage = true;
        tile.grid_size = surface.grid_size;
        tile.no_data = surface.window.no_data;
        if !surface.window.bounds.is_empty() {
            tile.set_bounding_volume_box(surface.window.bounds);
        }
        tile.terrain_vertices = Some(surface.window.vertices);

        if tile.zoom <= max_zoom {
            return;
        }
        if p_zoom >= max_zoom {
            tile.plain_radius = p_plain_radius / offset.dz2;
            tile.terrain_ready = true;
            tile.terrain_is_loading = false;
            if p_exists {
                tile.terrain_exists = true;
                tile.normal_map_vertices = tile.terrain_vertices.clone();
                tile.file_grid_size = surface.grid_size;
                tile.normal_map_normals = p_normals.map(|n| cut_normals(n, offset));
            }
            node.applied_terrain_node_id = Some(own_id);
            node.equalized_side_with_node_id = [own_id; 4];
        } else {
            self.load_deepest_terrain(idx, max_zoom, stop_loading);
        }
    }

    /// Drives the terrain of the ancestor at the deepest terrain zoom, the
    /// one tiles below it borrow from.
    fn load_deepest_terrain(&mut self, idx: NodeIdx, max_zoom: u32, stop_loading: bool) {
        let mut pn = idx;
        while let Some(node) = self.arena.get(pn) {
            match node.parent {
                Some(parent) if node.zoom() != max_zoom => pn = parent,
                _ => break,
            }
        }
        let Some(node) = self.arena.get_mut(pn) else {
            return;
        };
        if !node.tile.initialized {
            let log2 = node.tile.initialize(self.terrain.config());
            node.side_size_log2 = [log2; 4];
        }
        if !node.tile.plain_processing {
            self.create_plain_async(pn);
        }
        let plain_ready = self.arena.get(pn).map_or(false, |n| n.tile.plain_ready);
        if plain_ready && !stop_loading {
            self.load_terrain(pn, true);
        }
    }

    /// Id of the node whose terrain `idx` shows.
    pub fn applied_terrain_node(&self, idx: NodeIdx) -> Option<NodeId> {
        self.arena.get(idx)?.applied_terrain_node_id
    }
}

enum ParentBounds {
    /// The tile is covered by whole cells of the ancestor grid.
    Shared {
        corners: TileCorners,
        bsphere: BoundingSphere,
        bbox: Box3,
    },
    /// The tile is smaller than one cell.
    Patch { corners: TileCorners, bbox: Box3 },
}

fn parent_bounds(
    verts: &HighLowVertices,
    grid_size: u32,
    offset: Offset,
    bsphere: BoundingSphere,
    bbox: Box3,
) -> Option<ParentBounds> {
    let gs = f64::from(grid_size) / offset.dz2;
    let row = grid_size as usize + 1;
    if gs >= 1.0 {
        let size = gs as usize;
        let i0 = size * offset.y as usize;
        let j0 = size * offset.x as usize;
        return Some(ParentBounds::Shared {
            corners: TileCorners {
                sw: verts.get((i0 + size) * row + j0)?,
                nw: verts.get(i0 * row + j0)?,
                ne: verts.get(i0 * row + j0 + size)?,
                se: verts.get((i0 + size) * row + j0 + size)?,
            },
            bsphere,
            bbox,
        });
    }
    let surface = borrow_surface(verts, None, grid_size, offset)?;
    let v = &surface.window.vertices;
    Some(ParentBounds::Patch {
        corners: TileCorners {
            nw: v.get(0)?,
            ne: v.get(1)?,
            sw: v.get(2)?,
            se: v.get(3)?,
        },
        bbox: surface.window.bounds,
    })
}

/// The part of an ancestor's normal grid under a tile, or the whole grid
/// when it is too coarse to cut.
fn cut_normals(normals: Arc<Vec<f32>>, offset: Offset) -> Arc<Vec<f32>> {
    let fgs = ((normals.len() / 3) as f64).sqrt() - 1.0;
    let fgs_z = fgs / offset.dz2;
    if fgs > 1.0 && fgs_z >= 1.0 {
        let size = fgs_z as usize;
        if let Some(cut) = sub_array_f32(
            &normals,
            fgs as usize,
            size * offset.y as usize,
            size * offset.x as usize,
            size,
        ) {
            return Arc::new(cut);
        }
    }
    normals
}
