//! Per-tile lighting normals, finished a few tiles per frame.
use std::collections::VecDeque;

use crate::{
    arena::NodeArena,
    forest::QuadForest,
    lock::{Key, Lock},
    node::{NodeIdx, TileRef},
    quad::{NodeState, Side},
    tile::Tile,
};

#[derive(Debug, Default)]
pub struct NormalMapQueue {
    queue: VecDeque<TileRef>,
    lock: Lock,
}

impl NormalMapQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, tile_ref: TileRef, tile: &mut Tile) {
        tile.in_the_queue = true;
        self.queue.push_back(tile_ref);
    }

    /// Puts the tile first in line.
    pub fn unshift(&mut self, tile_ref: TileRef, tile: &mut Tile) {
        tile.in_the_queue = true;
        self.queue.push_front(tile_ref);
    }

    pub fn pop(&mut self) -> Option<TileRef> {
        self.queue.pop_front()
    }

    pub fn clear(&mut self, arena: &mut NodeArena) {
        while let Some(r) = self.queue.pop_back() {
            if let Some(node) = arena.resolve_mut(r) {
                node.tile.in_the_queue = false;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn lock(&mut self, key: Key) {
        self.lock.lock(key);
    }

    pub fn free(&mut self, key: Key) {
        self.lock.free(key);
    }

    pub fn is_free(&self) -> bool {
        self.lock.is_free()
    }
}

impl QuadForest {
    /// Works the normal map queue until it is empty, locked, or the frame
    /// budget is spent.
    pub(crate) fn create_normal_maps(&mut self) {
        let budget_ms = self.config.normal_map_budget_ms;
        let start = instant::Instant::now();
        while self.normal_maps.is_free() && start.elapsed().as_secs_f64() * 1000.0 < budget_ms {
            let Some(tile_ref) = self.normal_maps.pop() else {
                break;
            };
            if self.arena.resolve(tile_ref).is_none() {
                continue;
            }
            if self.draw_normal_map(tile_ref) {
                if let Some(node) = self.arena.resolve_mut(tile_ref) {
                    let tile = &mut node.tile;
                    tile.normal_map_ready = true;
                    tile.normal_map_texture = tile.normal_map_normals.clone();
                    tile.normal_map_bias = [0.0, 0.0, 1.0];
                }
            }
            if let Some(node) = self.arena.resolve_mut(tile_ref) {
                node.tile.in_the_queue = false;
            }
        }
    }

    fn draw_normal_map(&mut self, tile_ref: TileRef) -> bool {
        let idx = tile_ref.idx;
        let ready = match self.arena.resolve(tile_ref) {
            Some(node) => {
                node.tile.terrain_ready
                    && self.get_state(idx) != Some(NodeState::NotRendering)
                    && node.tile.normal_map_normals.as_ref().map_or(false, |n| !n.is_empty())
            }
            None => false,
        };
        if !ready {
            return false;
        }
        if self.terrain.config().equalize_normals {
            for side in [Side::North, Side::South, Side::West, Side::East] {
                self.normal_map_edge_equalize(idx, side);
            }
        }
        true
    }

    /// Points a tile without its own normals at the nearest ancestor's,
    /// queueing it for its own when the terrain is in.
    pub(crate) fn while_normal_map_creating(&mut self, idx: NodeIdx) {
        let Some(tile_ref) = self.arena.tile_ref(idx) else {
            return;
        };
        if let Some(node) = self.arena.get_mut(idx) {
            let tile = &mut node.tile;
            if !tile.terrain_is_loading && tile.terrain_exists && !tile.in_the_queue {
                self.normal_maps.queue(tile_ref, tile);
            }
        }

        let mut pn = idx;
        while let Some(node) = self.arena.get(pn) {
            match node.parent {
                Some(parent) if !node.tile.normal_map_ready => pn = parent,
                _ => break,
            }
        }
        let Some((px, py, pz, texture)) = self.arena.get(pn).map(|p| {
            (p.tile.x, p.tile.y, p.tile.zoom, p.tile.normal_map_texture.clone())
        }) else {
            return;
        };
        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        let tile = &mut node.tile;
        let dz = tile.zoom.saturating_sub(pz);
        let dz2 = 1u64 << dz;
        tile.normal_map_texture = texture;
        tile.normal_map_bias = [
            (i64::from(tile.x) - i64::from(px) * dz2 as i64) as f32,
            (i64::from(tile.y) - i64::from(py) * dz2 as i64) as f32,
            (1.0 / dz2 as f64) as f32,
        ];
    }
}
