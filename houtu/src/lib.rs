use bevy::prelude::*;
use houtu_quadtree::{
    EarthStrategy, EmptyTerrain, PlanetCamera, QuadForest, QuadForestConfig, Result,
};
use houtu_scene::Ellipsoid;

pub use houtu_quadtree as quadtree;
pub use houtu_scene as scene;

type MakeForest = Box<dyn Fn() -> Result<QuadForest> + Send + Sync>;

/// Keeps a [`QuadForest`] resource in step with the [`PlanetCamera`] resource,
/// one forest frame per update.
pub struct HoutuPlugin {
    make_forest: MakeForest,
}

impl Default for HoutuPlugin {
    fn default() -> Self {
        Self::new(|| {
            QuadForest::new(
                QuadForestConfig::default(),
                Ellipsoid::wgs84(),
                EarthStrategy,
                EmptyTerrain::default(),
            )
        })
    }
}

impl HoutuPlugin {
    pub fn new(make_forest: impl Fn() -> Result<QuadForest> + Send + Sync + 'static) -> Self {
        Self {
            make_forest: Box::new(make_forest),
        }
    }
}

impl Plugin for HoutuPlugin {
    fn build(&self, app: &mut App) {
        match (self.make_forest)() {
            Ok(forest) => {
                app.insert_resource(forest)
                    .add_systems(Update, forest_frame_system);
            }
            Err(e) => error!("Failed to create the quadtree forest: {}", e),
        }
    }
}

fn forest_frame_system(mut forest: ResMut<QuadForest>, camera: Option<Res<PlanetCamera>>) {
    let Some(camera) = camera else {
        return;
    };
    forest.frame(&camera);
    let stats = forest.stats();
    debug!(
        "forest: {} nodes, {} rendered, {} plain / {} terrain jobs pending",
        stats.nodes, stats.rendered_nodes, stats.pending_plain, stats.pending_terrain
    );
}
