//! Fast nearest neighbour raster warping.
//!
//! [`FastWarper`] reprojects one band of a source raster onto a destination
//! grid. It only materializes the part of the grid the source covers, reads
//! each needed source block exactly once, prefers a matching overview when
//! downsampling, and caches the expensive CRS transforms between calls.
//!
//! Raster access and reprojection are pluggable, see [`engine`]. The `gdal`
//! feature binds both to GDAL.
//!
//! ```
//! use fastwarp::{DataType, FastWarper, GeoTransform, WarpConfig, WarpRequest, engine::memory::*};
//! use std::sync::Arc;
//!
//! let access = Arc::new(MemoryRasterAccess::new());
//! access.insert("dem", MemoryDataset::with_single_band(MemoryBand::filled(4, 4, DataType::Byte, 7.0)));
//! let warper = FastWarper::new(access, Arc::new(AffineReprojection::new()), WarpConfig::default()).unwrap();
//!
//! let output = warper.warp(&WarpRequest::new("dem", GeoTransform::IDENTITY, 4, 4)).unwrap();
//! assert_eq!(output.data, vec![7u8; 16]);
//! ```

pub mod engine;
pub mod transform;
pub mod warp;

pub use fastwarp_core::{DataType, DestinationWindow, GeoTransform, RasterType, WarpConfig, WarpError, WarpStatus};
pub use warp::{FastWarper, ReprojectExtent, WarpMetrics, WarpOutput, WarpRequest};
