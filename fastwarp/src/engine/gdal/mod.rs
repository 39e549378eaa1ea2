//! GDAL bindings of the raster access and reprojection interfaces.
//!
//! GDAL handles are not thread safe. Block reads of one dataset are
//! serialized behind a lock shared by its bands and overviews, CRS transforms
//! lock their handle per batch.

mod dataset;
mod reprojection;

pub use dataset::{GdalBand, GdalDataset, GdalRasterAccess};
pub use reprojection::GdalReprojection;
