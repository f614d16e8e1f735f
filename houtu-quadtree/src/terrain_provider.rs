//! Sources of elevation data. A provider takes requests from the frame thread
//! and hands back responses on a later poll.
use std::{collections::HashMap, sync::Arc};

use bevy::log::debug;
use houtu_jobs::{AsyncReturn, Context, Job, JobQueue, JobToken};
use houtu_scene::{Extent, LonLat, Projection};

use crate::{config::TerrainConfig, node::TileRef, tile::TileGroup};

/// Address of a tile's elevation grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub group: TileGroup,
    pub x: u32,
    pub y: u32,
    pub zoom: u32,
}

#[derive(Debug, Clone)]
pub struct TerrainRequest {
    pub tile: TileRef,
    pub key: TileKey,
    /// Native extent, sampled north west first.
    pub extent: Extent,
    pub projection: Projection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerrainResponse {
    /// `(file_grid_size + 1)²` heights in meters.
    Elevations(Arc<Vec<f32>>),
    /// The provider has nothing for this tile.
    NotExists,
    /// Loading was cancelled before it finished.
    Aborted,
}

pub trait TerrainProvider: Send + Sync {
    fn config(&self) -> &TerrainConfig;

    /// Lon/lat area the provider covers.
    fn extent(&self) -> Extent {
        Extent::from_array([-180.0, -90.0, 180.0, 90.0])
    }

    fn is_ready(&self) -> bool {
        true
    }

    /// Starts loading. A response already at hand is returned right away,
    /// everything else arrives through [`TerrainProvider::poll`].
    fn load_terrain(&mut self, request: TerrainRequest, force: bool) -> Option<TerrainResponse>;

    fn poll(&mut self) -> Vec<(TerrainRequest, TerrainResponse)>;

    /// Cancels requests that have not started. They come back as
    /// [`TerrainResponse::Aborted`].
    fn abort_loading(&mut self);

    fn clear_cache(&mut self);

    /// Requests issued and not yet answered.
    fn loading_count(&self) -> usize;
}

/// Flat globe: every tile keeps its plain surface.
#[derive(Debug)]
pub struct EmptyTerrain {
    config: TerrainConfig,
}

impl Default for EmptyTerrain {
    fn default() -> Self {
        Self::new(TerrainConfig::empty())
    }
}

impl EmptyTerrain {
    pub fn new(config: TerrainConfig) -> Self {
        Self { config }
    }
}

impl TerrainProvider for EmptyTerrain {
    fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Answers on the spot, nothing is ever in flight.
    fn load_terrain(&mut self, _request: TerrainRequest, _force: bool) -> Option<TerrainResponse> {
        Some(TerrainResponse::NotExists)
    }

    fn poll(&mut self) -> Vec<(TerrainRequest, TerrainResponse)> {
        vec![]
    }

    fn abort_loading(&mut self) {}

    fn clear_cache(&mut self) {}

    fn loading_count(&self) -> usize {
        0
    }
}

/// Height in meters at a lon/lat in degrees, `None` where there is no data.
pub trait HeightField: Send + Sync + 'static {
    fn height(&self, lon: f64, lat: f64) -> Option<f32>;
}

impl<F> HeightField for F
where
    F: Fn(f64, f64) -> Option<f32> + Send + Sync + 'static,
{
    fn height(&self, lon: f64, lat: f64) -> Option<f32> {
        self(lon, lat)
    }
}

/// Samples a [`HeightField`] on a tile's elevation grid.
pub struct ElevationJob {
    pub key: TileKey,
    pub extent: Extent,
    pub projection: Projection,
    pub file_grid_size: u32,
    pub no_data_value: f32,
    pub field: Arc<dyn HeightField>,
}

impl ElevationJob {
    pub fn sample(&self) -> Vec<f32> {
        let size = self.file_grid_size.max(1);
        let e = self.extent;
        let lon_step = e.width() / f64::from(size);
        let lat_step = e.height() / f64::from(size);
        let mut heights = Vec::with_capacity(((size + 1) * (size + 1)) as usize);
        for i in 0..=size {
            for j in 0..=size {
                let native = LonLat::new(
                    e.south_west.lon + f64::from(j) * lon_step,
                    e.north_east.lat - f64::from(i) * lat_step,
                    0.0,
                );
                let ll = self.projection.unproject(&native);
                heights.push(self.field.height(ll.lon, ll.lat).unwrap_or(self.no_data_value));
            }
        }
        heights
    }
}

impl Job for ElevationJob {
    type Outcome = Vec<f32>;

    fn name(&self) -> String {
        format!(
            "elevations {:?} {}/{}/{}",
            self.key.group, self.key.zoom, self.key.x, self.key.y
        )
    }

    fn perform(self, _: Context) -> AsyncReturn<Vec<f32>> {
        Box::pin(async move { self.sample() })
    }
}

/// Terrain computed from a height field on the job pool, cached per tile.
pub struct GeneratedTerrain {
    config: TerrainConfig,
    extent: Extent,
    field: Arc<dyn HeightField>,
    jobs: JobQueue<ElevationJob>,
    requests: HashMap<JobToken, TerrainRequest>,
    aborted: Vec<(TerrainRequest, TerrainResponse)>,
    cache: HashMap<TileKey, Arc<Vec<f32>>>,
}

impl GeneratedTerrain {
    pub fn new(config: TerrainConfig, field: impl HeightField, workers: usize) -> Self {
        Self {
            config,
            extent: Extent::from_array([-180.0, -90.0, 180.0, 90.0]),
            field: Arc::new(field),
            jobs: JobQueue::new("elevations", workers),
            requests: HashMap::new(),
            aborted: vec![],
            cache: HashMap::new(),
        }
    }

    /// Limits the provider to a lon/lat area.
    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = extent;
        self
    }

    pub fn cached(&self, key: &TileKey) -> Option<Arc<Vec<f32>>> {
        self.cache.get(key).cloned()
    }
}

impl TerrainProvider for GeneratedTerrain {
    fn config(&self) -> &TerrainConfig {
        &self.config
    }

    fn extent(&self) -> Extent {
        self.extent
    }

    fn load_terrain(&mut self, request: TerrainRequest, _force: bool) -> Option<TerrainResponse> {
        if let Some(heights) = self.cache.get(&request.key) {
            return Some(TerrainResponse::Elevations(heights.clone()));
        }
        let job = ElevationJob {
            key: request.key,
            extent: request.extent,
            projection: request.projection,
            file_grid_size: self.config.file_grid_size,
            no_data_value: self.config.no_data_values.first().copied().unwrap_or(f32::MIN),
            field: self.field.clone(),
        };
        let token = self.jobs.submit(job);
        self.requests.insert(token, request);
        None
    }

    fn poll(&mut self) -> Vec<(TerrainRequest, TerrainResponse)> {
        let mut responses: Vec<_> = self.aborted.drain(..).collect();
        for finished in self.jobs.poll() {
            let Some(request) = self.requests.remove(&finished.token) else {
                continue;
            };
            let heights = Arc::new(finished.outcome);
            self.cache.insert(request.key, heights.clone());
            responses.push((request, TerrainResponse::Elevations(heights)));
        }
        responses
    }

    fn abort_loading(&mut self) {
        let tokens: Vec<_> = self.requests.keys().copied().collect();
        for token in tokens {
            if self.jobs.cancel(token) {
                if let Some(request) = self.requests.remove(&token) {
                    self.aborted.push((request, TerrainResponse::Aborted));
                }
            }
        }
        debug!("aborted {} elevation requests", self.aborted.len());
    }

    fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn loading_count(&self) -> usize {
        self.requests.len() + self.aborted.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bevy::tasks::{AsyncComputeTaskPool, TaskPool};
    use houtu_scene::mercator;

    use super::*;
    use crate::node::{NodeId, NodeIdx};

    fn request(x: u32, y: u32, zoom: u32) -> TerrainRequest {
        TerrainRequest {
            tile: TileRef {
                idx: NodeIdx(0),
                id: NodeId(7),
            },
            key: TileKey {
                group: TileGroup::Common,
                x,
                y,
                zoom,
            },
            extent: mercator::get_tile_extent(x, y, zoom),
            projection: Projection::Epsg3857,
        }
    }

    fn settle(provider: &mut dyn TerrainProvider) -> Vec<(TerrainRequest, TerrainResponse)> {
        let deadline = instant::Instant::now() + Duration::from_secs(10);
        let mut out = vec![];
        while provider.loading_count() > 0 && instant::Instant::now() < deadline {
            out.extend(provider.poll());
            std::thread::sleep(Duration::from_millis(1));
        }
        out
    }

    #[test]
    fn empty_terrain_answers_not_exists() {
        let mut provider = EmptyTerrain::default();
        assert_eq!(
            provider.load_terrain(request(0, 0, 1), false),
            Some(TerrainResponse::NotExists)
        );
        assert!(provider.poll().is_empty());
        assert_eq!(provider.loading_count(), 0);
    }

    #[test]
    fn samples_field_and_caches() {
        AsyncComputeTaskPool::init(TaskPool::new);
        let mut config = TerrainConfig::elevation();
        config.file_grid_size = 4;
        let mut provider = GeneratedTerrain::new(
            config,
            |lon: f64, _lat: f64| if lon < 0.0 { None } else { Some(10.0) },
            2,
        );
        assert!(provider.load_terrain(request(1, 1, 2), false).is_none());
        let answers = settle(&mut provider);
        assert_eq!(answers.len(), 1);
        let TerrainResponse::Elevations(heights) = &answers[0].1 else {
            panic!("expected elevations");
        };
        assert_eq!(heights.len(), 25);
        assert_eq!(heights[0], -32767.0);
        assert_eq!(heights[4], 10.0);

        let again = provider.load_terrain(request(1, 1, 2), false);
        assert_eq!(again, Some(TerrainResponse::Elevations(heights.clone())));
        provider.clear_cache();
        assert!(provider.cached(&request(1, 1, 2).key).is_none());
    }

    #[test]
    fn abort_reports_pending_requests() {
        AsyncComputeTaskPool::init(TaskPool::new);
        let mut provider = GeneratedTerrain::new(TerrainConfig::elevation(), |_: f64, _: f64| Some(1.0), 1);
        for x in 0..4 {
            provider.load_terrain(request(x, 0, 2), false);
        }
        provider.abort_loading();
        let answers = settle(&mut provider);
        assert_eq!(answers.len(), 4);
        let aborted = answers.iter().filter(|(_, r)| *r == TerrainResponse::Aborted).count();
        assert!(aborted >= 3);
    }
}
