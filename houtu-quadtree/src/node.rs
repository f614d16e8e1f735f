//! Structural quadtree element. A node owns its tile and refers to parent,
//! children and neighbours by arena index.
use std::fmt;

use crate::{
    quad::{NodeState, Quadrant},
    tile::Tile,
};

/// Slot of a node inside the [`NodeArena`](crate::arena::NodeArena). Slots
/// are reused after a node is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub usize);

/// Identity of a node for its whole life. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// Handle that survives slot reuse: the id tells a recycled slot apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRef {
    pub idx: NodeIdx,
    pub id: NodeId,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeIdx>,
    /// `None` for roots.
    pub part: Option<Quadrant>,
    pub children: Option<[NodeIdx; 4]>,
    pub state: Option<NodeState>,
    pub prev_state: Option<NodeState>,
    /// Node whose terrain this tile currently shows.
    pub applied_terrain_node_id: Option<NodeId>,
    /// Per side, the node whose edge was last copied into this tile.
    pub equalized_side_with_node_id: [NodeId; 4],
    /// log2 of the edge resolution the index strip uses on each side.
    pub side_size_log2: [u32; 4],
    pub neighbors: [Vec<NodeIdx>; 4],
    pub in_frustum: u32,
    pub camera_inside: bool,
    pub fading_nodes: Vec<NodeIdx>,
    pub tile: Tile,
}

impl Node {
    pub fn new(id: NodeId, parent: Option<NodeIdx>, part: Option<Quadrant>, tile: Tile) -> Self {
        Node {
            id,
            parent,
            part,
            children: None,
            state: None,
            prev_state: None,
            applied_terrain_node_id: None,
            equalized_side_with_node_id: [id; 4],
            side_size_log2: [0; 4],
            neighbors: Default::default(),
            in_frustum: 0,
            camera_inside: false,
            fading_nodes: vec![],
            tile,
        }
    }

    /// Children exist, either all four or none.
    pub fn ready(&self) -> bool {
        self.children.is_some()
    }

    pub fn zoom(&self) -> u32 {
        self.tile.zoom
    }

    pub fn clear_neighbors(&mut self) {
        for side in self.neighbors.iter_mut() {
            side.clear();
        }
    }

    pub fn has_neighbors(&self) -> bool {
        self.neighbors.iter().any(|n| !n.is_empty())
    }
}
