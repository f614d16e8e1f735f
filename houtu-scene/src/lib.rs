mod bounding_sphere;
mod box3d;
mod culling_volume;
mod ellipsoid;
mod extent;
mod geometry;
mod lon_lat;
pub mod math;
mod projection;
pub mod web_mercator_projection;

pub use bounding_sphere::*;
pub use box3d::*;
pub use culling_volume::*;
pub use ellipsoid::*;
pub use extent::*;
pub use geometry::*;
pub use lon_lat::*;
pub use projection::*;
pub use web_mercator_projection as mercator;
