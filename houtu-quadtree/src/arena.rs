//! Index based storage for the forest's nodes.
use std::collections::VecDeque;

use crate::node::{Node, NodeId, NodeIdx, TileRef};

#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Option<Node>>,
    /// Slots of destroyed nodes, handed out again before the vec grows.
    free_list: VecDeque<usize>,
    next_id: u64,
    live: usize,
    /// Nodes made since the last memory sweep.
    created: usize,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, node: Node) -> NodeIdx {
        self.live += 1;
        self.created += 1;
        if let Some(slot) = self.free_list.pop_front() {
            self.slots[slot] = Some(node);
            NodeIdx(slot)
        } else {
            self.slots.push(Some(node));
            NodeIdx(self.slots.len() - 1)
        }
    }

    pub fn remove(&mut self, idx: NodeIdx) -> Option<Node> {
        let node = self.slots.get_mut(idx.0)?.take()?;
        self.live -= 1;
        self.free_list.push_back(idx.0);
        Some(node)
    }

    pub fn get(&self, idx: NodeIdx) -> Option<&Node> {
        self.slots.get(idx.0)?.as_ref()
    }

    pub fn get_mut(&mut self, idx: NodeIdx) -> Option<&mut Node> {
        self.slots.get_mut(idx.0)?.as_mut()
    }

    /// The node behind `r`, unless its slot was freed or reused since.
    pub fn resolve(&self, r: TileRef) -> Option<&Node> {
        self.get(r.idx).filter(|n| n.id == r.id)
    }

    pub fn resolve_mut(&mut self, r: TileRef) -> Option<&mut Node> {
        self.get_mut(r.idx).filter(|n| n.id == r.id)
    }

    pub fn tile_ref(&self, idx: NodeIdx) -> Option<TileRef> {
        self.get(idx).map(|n| TileRef { idx, id: n.id })
    }

    /// Two distinct nodes borrowed mutably at once.
    pub fn pair_mut(&mut self, a: NodeIdx, b: NodeIdx) -> Option<(&mut Node, &mut Node)> {
        if a == b || a.0 >= self.slots.len() || b.0 >= self.slots.len() {
            return None;
        }
        let (first, second) = if a.0 < b.0 { (a.0, b.0) } else { (b.0, a.0) };
        let (head, tail) = self.slots.split_at_mut(second);
        let low = head[first].as_mut()?;
        let high = tail[0].as_mut()?;
        if a.0 < b.0 {
            Some((low, high))
        } else {
            Some((high, low))
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn reset_created(&mut self) {
        self.created = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIdx, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeIdx(i), n)))
    }
}
