//! Tile quadtrees over an ellipsoid: which tiles to draw for a camera, and
//! their surfaces built off the frame thread.
mod arena;
mod camera;
mod config;
mod equalize;
mod error;
mod fading;
mod forest;
pub mod grid;
pub mod indexes;
mod lock;
mod neighbors;
mod node;
mod normal_map;
mod pipeline;
mod propagation;
mod quad;
mod strategy;
pub mod terrain_provider;
pub mod tile;
mod traversal;
mod workers;

pub use arena::*;
pub use camera::*;
pub use config::*;
pub use equalize::edge_vertex;
pub use error::*;
pub use forest::*;
pub use lock::*;
pub use neighbors::get_common_side;
pub use node::*;
pub use normal_map::*;
pub use quad::*;
pub use strategy::*;
pub use terrain_provider::{
    EmptyTerrain, GeneratedTerrain, HeightField, TerrainProvider, TerrainRequest,
    TerrainResponse, TileKey,
};
pub use tile::{Tile, TileGroup, TileKind, TerrainState};
pub use workers::*;
