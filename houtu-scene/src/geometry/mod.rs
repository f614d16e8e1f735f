mod plane;
mod ray;

pub use plane::*;
pub use ray::*;
