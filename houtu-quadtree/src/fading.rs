//! Cross-fade between a tile and the level it replaces.
use std::collections::HashSet;

use crate::{forest::QuadForest, node::NodeIdx, quad::NodeState};

/// Tiles above this zoom never fade.
const MIN_FADING_ZOOM: u32 = 3;

impl QuadForest {
    /// Fade bookkeeping for the drawn tiles, then the set of replaced tiles
    /// drawn under them, then the neighbour links the fade order skipped.
    pub(crate) fn collect_fading(&mut self) {
        let now = self.now_ms();
        for i in 0..self.rendered_nodes.len() {
            let idx = self.rendered_nodes[i];
            self.collect_fading_nodes(idx, now);
            self.refresh_transition_opacity(idx, now);
        }

        let mut seen = HashSet::new();
        let mut opaque = vec![];
        for idx in self.rendered_nodes.iter() {
            let Some(node) = self.arena.get(*idx) else {
                continue;
            };
            for f in node.fading_nodes.iter() {
                let drawn = self.arena.get(*f).map_or(false, |n| n.state == Some(NodeState::Rendering));
                if !drawn && seen.insert(*f) {
                    opaque.push(*f);
                }
            }
        }
        self.fading_opaque = opaque;

        self.rebuild_rendered_neighbors();
    }

    fn rebuild_rendered_neighbors(&mut self) {
        for i in 0..self.rendered_nodes.len() {
            let idx = self.rendered_nodes[i];
            if let Some(node) = self.arena.get_mut(idx) {
                node.clear_neighbors();
            }
        }
        for i in 1..self.rendered_nodes.len() {
            let idx = self.rendered_nodes[i];
            for j in (0..i).rev() {
                let other = self.rendered_nodes[j];
                if let Some(side) = self.common_side(idx, other) {
                    self.apply_neighbor(idx, other, side);
                }
            }
        }
    }

    /// A tile lighting up this frame fades over the parent drawn last frame,
    /// or over the four children it just replaced.
    pub(crate) fn collect_fading_nodes(&mut self, idx: NodeIdx, now_ms: f64) {
        let Some(node) = self.arena.get_mut(idx) else {
            return;
        };
        if node.zoom() < MIN_FADING_ZOOM {
            node.tile.transition_opacity = 1.0;
            return;
        }
        if node.prev_state == Some(NodeState::Rendering) {
            return;
        }
        node.tile.transition_opacity = 0.0;
        node.tile.transition_timestamp = now_ms;
        node.fading_nodes.clear();
        let children = node.children;
        let Some(parent) = node.parent else {
            return;
        };

        let parent_was_drawn = self
            .arena
            .get(parent)
            .map_or(false, |p| p.prev_state == Some(NodeState::Rendering));
        if parent_was_drawn {
            let mut pn = self.arena.get(parent).and_then(|p| p.parent);
            while let Some(p) = pn {
                if self.is_fading(p) {
                    self.stop_fading(p);
                    break;
                }
                pn = self.arena.get(p).and_then(|n| n.parent);
            }
            self.while_terrain_loading(parent, None, false);
            if let Some(p) = self.arena.get_mut(parent) {
                p.tile.transition_opacity = 2.0;
                p.tile.transition_timestamp = now_ms;
            }
            if let Some(node) = self.arena.get_mut(idx) {
                node.fading_nodes.push(parent);
            }
            return;
        }

        let Some(children) = children else {
            return;
        };
        let initialized = children
            .iter()
            .all(|c| self.arena.get(*c).map_or(false, |n| n.tile.initialized));
        if !initialized || !self.children_prev_state_equals(idx, NodeState::Rendering) {
            return;
        }
        for c in children {
            self.while_terrain_loading(c, None, false);
            if let Some(child) = self.arena.get_mut(c) {
                child.tile.transition_opacity = 2.0;
                child.tile.transition_timestamp = now_ms;
                child.prev_state = child.state;
                child.state = Some(NodeState::NotRendering);
            }
        }
        if let Some(node) = self.arena.get_mut(idx) {
            node.fading_nodes.extend(children);
        }
    }

    /// Drops a running fade: the children show at full opacity, the parent
    /// behind them is gone.
    fn stop_fading(&mut self, idx: NodeIdx) {
        if let Some(children) = self.arena.get(idx).and_then(|n| n.children) {
            for c in children {
                if let Some(child) = self.arena.get_mut(c) {
                    child.tile.transition_opacity = 1.0;
                    child.fading_nodes.clear();
                }
            }
        }
        if let Some(node) = self.arena.get_mut(idx) {
            node.tile.transition_opacity = 0.0;
        }
    }

    pub(crate) fn refresh_transition_opacity(&mut self, idx: NodeIdx, now_ms: f64) {
        let duration = self.config.transition_duration_ms;
        let children_drawn = self.children_prev_state_equals(idx, NodeState::Rendering);
        let Some(node) = self.arena.get(idx) else {
            return;
        };
        let opacity = node.tile.transition_opacity;
        let fading = node.fading_nodes.clone();

        if fading.is_empty() || (fading.len() == 4 && !children_drawn) {
            if let Some(node) = self.arena.get_mut(idx) {
                node.tile.transition_opacity = 1.0;
                node.fading_nodes.clear();
            }
            return;
        }
        // a fading tile that already vanished leaves a hole: show this one
        let vanished = opacity < 1.0
            && fading
                .iter()
                .any(|f| self.arena.get(*f).map_or(true, |n| n.tile.transition_opacity == 0.0));
        if let Some(node) = self.arena.get_mut(idx) {
            if vanished {
                node.tile.transition_opacity = 1.0;
            }
            node.tile.increase_transition_opacity(now_ms, duration);
        }
    }

    /// Walked through with a visible fade and all four children drawn.
    pub fn is_fading(&self, idx: NodeIdx) -> bool {
        let Some(node) = self.arena.get(idx) else {
            return false;
        };
        node.state == Some(NodeState::Walkthrough)
            && node.tile.transition_opacity > 0.0
            && node.children.map_or(false, |children| {
                children
                    .iter()
                    .all(|c| self.arena.get(*c).map_or(false, |n| n.state == Some(NodeState::Rendering)))
            })
    }

    pub fn children_prev_state_equals(&self, idx: NodeIdx, state: NodeState) -> bool {
        self.arena
            .get(idx)
            .and_then(|n| n.children)
            .map_or(false, |children| {
                children
                    .iter()
                    .all(|c| self.arena.get(*c).map_or(false, |n| n.prev_state == Some(state)))
            })
    }
}
