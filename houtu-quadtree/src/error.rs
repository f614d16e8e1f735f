use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid forest config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("grid size {size} at zoom {zoom} is not a power of two")]
    InvalidGridSize { zoom: usize, size: u32 },
    #[error("tiles split down to zoom {zoom}, deeper than {max}")]
    ZoomTooDeep { zoom: u32, max: u32 },
    #[error("terrain data has {actual} samples, expected {expected}")]
    MalformedTerrain { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
