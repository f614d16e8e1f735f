//! Background geometry jobs and the bookkeeping that maps their results back
//! to live tiles.
use std::collections::HashMap;

use bevy::log::debug;
use houtu_jobs::{AsyncReturn, Context, Job, JobQueue, JobToken};

use crate::{
    error::Result,
    node::TileRef,
    tile::{
        create_plain_geometry, create_terrain_geometry, PlainGeometry, PlainParams,
        TerrainGeometry, TerrainParams,
    },
};

pub struct PlainTileJob {
    pub params: PlainParams,
}

impl Job for PlainTileJob {
    type Outcome = PlainGeometry;

    fn name(&self) -> String {
        format!("plain tile grid {}", self.params.grid_size)
    }

    fn perform(self, _: Context) -> AsyncReturn<PlainGeometry> {
        Box::pin(async move { create_plain_geometry(&self.params) })
    }
}

pub struct TerrainTileJob {
    pub params: TerrainParams,
}

impl Job for TerrainTileJob {
    type Outcome = Result<TerrainGeometry>;

    fn name(&self) -> String {
        format!("terrain tile grid {}", self.params.grid_size)
    }

    fn perform(self, _: Context) -> AsyncReturn<Result<TerrainGeometry>> {
        Box::pin(async move { create_terrain_geometry(&self.params) })
    }
}

/// A job result for a tile that still waits for it.
pub struct Delivery<T> {
    pub tile: TileRef,
    pub token: JobToken,
    pub outcome: T,
}

pub struct TileWorkers {
    plain: JobQueue<PlainTileJob>,
    terrain: JobQueue<TerrainTileJob>,
    plain_sources: HashMap<JobToken, TileRef>,
    terrain_sources: HashMap<JobToken, TileRef>,
    dropped: usize,
}

impl TileWorkers {
    pub fn new(plain_workers: usize, terrain_workers: usize) -> Self {
        Self {
            plain: JobQueue::new("plain tiles", plain_workers),
            terrain: JobQueue::new("terrain tiles", terrain_workers),
            plain_sources: HashMap::new(),
            terrain_sources: HashMap::new(),
            dropped: 0,
        }
    }

    pub fn submit_plain(&mut self, tile: TileRef, params: PlainParams) -> JobToken {
        let token = self.plain.submit(PlainTileJob { params });
        self.plain_sources.insert(token, tile);
        token
    }

    pub fn submit_terrain(&mut self, tile: TileRef, params: TerrainParams) -> JobToken {
        let token = self.terrain.submit(TerrainTileJob { params });
        self.terrain_sources.insert(token, tile);
        token
    }

    pub fn poll_plain(&mut self) -> Vec<Delivery<PlainGeometry>> {
        let finished = self.plain.poll();
        let mut out = Vec::with_capacity(finished.len());
        for f in finished {
            match self.plain_sources.remove(&f.token) {
                Some(tile) => out.push(Delivery {
                    tile,
                    token: f.token,
                    outcome: f.outcome,
                }),
                None => {
                    self.dropped += 1;
                    debug!("dropped plain result {} for a forgotten tile", f.token);
                }
            }
        }
        out
    }

    pub fn poll_terrain(&mut self) -> Vec<Delivery<Result<TerrainGeometry>>> {
        let finished = self.terrain.poll();
        let mut out = Vec::with_capacity(finished.len());
        for f in finished {
            match self.terrain_sources.remove(&f.token) {
                Some(tile) => out.push(Delivery {
                    tile,
                    token: f.token,
                    outcome: f.outcome,
                }),
                None => {
                    self.dropped += 1;
                    debug!("dropped terrain result {} for a forgotten tile", f.token);
                }
            }
        }
        out
    }

    /// Unlinks every job of `tile`. Jobs still waiting are cancelled, running
    /// ones finish and are dropped on arrival.
    pub fn forget(&mut self, tile: TileRef) {
        let plain: Vec<_> = self
            .plain_sources
            .iter()
            .filter(|(_, t)| **t == tile)
            .map(|(token, _)| *token)
            .collect();
        for token in plain {
            self.plain_sources.remove(&token);
            self.plain.cancel(token);
        }
        let terrain: Vec<_> = self
            .terrain_sources
            .iter()
            .filter(|(_, t)| **t == tile)
            .map(|(token, _)| *token)
            .collect();
        for token in terrain {
            self.terrain_sources.remove(&token);
            self.terrain.cancel(token);
        }
    }

    pub fn pending_plain(&self) -> usize {
        self.plain.pending_len() + self.plain.in_flight()
    }

    pub fn pending_terrain(&self) -> usize {
        self.terrain.pending_len() + self.terrain.in_flight()
    }

    pub fn is_idle(&self) -> bool {
        self.plain.is_idle() && self.terrain.is_idle()
    }

    /// Counts a delivery its tile stopped waiting for after it arrived.
    pub fn note_stale(&mut self, token: JobToken) {
        self.dropped += 1;
        debug!("dropped stale result {}", token);
    }

    /// Results that arrived for tiles no longer waiting for them.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
