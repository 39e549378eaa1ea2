//! Data model shared by the fastwarp crates: geotransforms, raster data types,
//! destination windows, block grids, sample conversion, scratch buffer pooling,
//! status codes and configuration.

pub mod config;
pub mod convert;
pub mod error;
pub mod pool;
pub mod types;

pub use config::{SubdatasetConfig, WarpConfig};
pub use error::{WarpError, WarpStage, WarpStatus};
pub use pool::{BufferPool, PooledBuffer};
pub use types::*;
