//! Collaborator interfaces: raster access and reprojection.
//!
//! The warp pipeline only talks to these traits. [`memory`] holds in-memory
//! rasters and linear CRS pairs; the `gdal` module (cargo feature `gdal`)
//! binds them to GDAL.

#[cfg(feature = "gdal")]
pub mod gdal;
pub mod memory;

use crate::transform::{ApproxTransformer, SuggestedOutput, TransformContext, suggest_output};
use anyhow::Result;
use fastwarp_core::{DataType, GeoTransform};
use std::{fmt::Debug, sync::Arc};

/// What to open and how.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OpenRequest {
	pub path: String,
	/// Restricts the drivers allowed to open `path`; empty means any.
	pub drivers: Vec<String>,
	/// Driver open options as `KEY=VALUE`.
	pub options: Vec<String>,
}

impl OpenRequest {
	pub fn new(path: &str) -> Self {
		OpenRequest {
			path: path.to_string(),
			..Default::default()
		}
	}

	pub fn option(&self, key: &str) -> Option<&str> {
		self.options.iter().find_map(|o| {
			let (k, v) = o.split_once('=')?;
			k.eq_ignore_ascii_case(key).then_some(v)
		})
	}
}

/// Opens raster datasets.
pub trait RasterAccess: Send + Sync {
	fn open(&self, request: &OpenRequest) -> Result<Box<dyn RasterDataset>>;
}

/// An opened raster dataset.
pub trait RasterDataset: Send + Sync {
	fn raster_size(&self) -> (usize, usize);

	/// CRS definition of the dataset, if it has one.
	fn projection(&self) -> Option<String>;

	fn geo_transform(&self) -> Option<GeoTransform>;

	fn band_count(&self) -> usize;

	/// Returns band `index`, counted from 1.
	fn band(&self, index: usize) -> Result<Box<dyn RasterBand + '_>>;
}

/// One band of a raster, or one of its overviews.
pub trait RasterBand: Send + Sync {
	fn raster_size(&self) -> (usize, usize);

	/// Natural block size of the band.
	fn block_size(&self) -> (usize, usize);

	fn data_type(&self) -> DataType;

	fn no_data_value(&self) -> Option<f64>;

	fn overview_count(&self) -> usize;

	/// Returns overview `index`, counted from 0 (highest resolution first).
	fn overview(&self, index: usize) -> Result<Box<dyn RasterBand + '_>>;

	/// Reads block `(x_block, y_block)` into `buffer`.
	///
	/// `buffer` holds one full block in native byte order; partial edge blocks
	/// keep the full block width as row stride.
	fn read_block(&self, x_block: usize, y_block: usize, buffer: &mut [u8]) -> Result<()>;

	fn metadata_item(&self, key: &str, domain: &str) -> Option<String>;
}

impl<T: RasterBand + ?Sized> RasterBand for &T {
	fn raster_size(&self) -> (usize, usize) {
		(**self).raster_size()
	}

	fn block_size(&self) -> (usize, usize) {
		(**self).block_size()
	}

	fn data_type(&self) -> DataType {
		(**self).data_type()
	}

	fn no_data_value(&self) -> Option<f64> {
		(**self).no_data_value()
	}

	fn overview_count(&self) -> usize {
		(**self).overview_count()
	}

	fn overview(&self, index: usize) -> Result<Box<dyn RasterBand + '_>> {
		(**self).overview(index)
	}

	fn read_block(&self, x_block: usize, y_block: usize, buffer: &mut [u8]) -> Result<()> {
		(**self).read_block(x_block, y_block, buffer)
	}

	fn metadata_item(&self, key: &str, domain: &str) -> Option<String> {
		(**self).metadata_item(key, domain)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
	SourceToDestination,
	DestinationToSource,
}

/// A batch point transformation with per-point success flags.
///
/// Points are transformed in place. A point that cannot be transformed keeps
/// an unspecified value and gets `false` in `success`; the call itself only
/// fails when the whole batch cannot be attempted.
pub trait PointTransform: Send + Sync {
	fn transform(
		&self,
		direction: Direction,
		xs: &mut [f64],
		ys: &mut [f64],
		zs: &mut [f64],
		success: &mut [bool],
	) -> Result<()>;
}

impl Debug for dyn PointTransform {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("PointTransform")
	}
}

/// Creates and destroys transform contexts.
///
/// Implementors only provide the CRS and geolocation sub-transforms; the
/// context plumbing is shared.
pub trait Reprojection: Send + Sync {
	/// Transform between two CRS definitions, or `None` when they are
	/// equivalent and no reprojection step is needed.
	fn create_crs_transform(&self, src_crs: &str, dst_crs: &str) -> Result<Option<Arc<dyn PointTransform>>>;

	/// Transform from source pixel/line to the geolocation arrays' CRS.
	fn create_geolocation_transform(&self, options: &[String]) -> Result<Arc<dyn PointTransform>>;

	/// Context mapping destination pixels to source pixels through the source
	/// geotransform, an optional CRS step and the destination geotransform.
	fn create_transform_context(
		&self,
		src_crs: &str,
		src_gt: &GeoTransform,
		dst_crs: Option<&str>,
		dst_gt: &GeoTransform,
	) -> Result<TransformContext> {
		let reprojection = match dst_crs {
			Some(dst_crs) => self.create_crs_transform(src_crs, dst_crs)?,
			None => None,
		};
		TransformContext::new_affine(src_gt, reprojection, dst_gt)
	}

	/// Like [`Reprojection::create_transform_context`], with the source
	/// georeferenced by geolocation arrays instead of a geotransform.
	fn create_geolocation_context(
		&self,
		src_crs: &str,
		options: &[String],
		dst_crs: Option<&str>,
		dst_gt: &GeoTransform,
	) -> Result<TransformContext> {
		let geolocation = self.create_geolocation_transform(options)?;
		let reprojection = match dst_crs {
			Some(dst_crs) => self.create_crs_transform(src_crs, dst_crs)?,
			None => None,
		};
		TransformContext::new_geolocated(geolocation, reprojection, dst_gt)
	}

	/// Estimates the destination grid covering a source raster of
	/// `raster_size`.
	fn suggest_output_window(
		&self,
		raster_size: (usize, usize),
		context: &TransformContext,
	) -> Result<SuggestedOutput> {
		suggest_output(raster_size, context)
	}

	/// Wraps `context` in a row approximator with `tolerance` in output pixels.
	fn create_approximation<'a>(&self, context: &'a TransformContext, tolerance: f64) -> ApproxTransformer<'a> {
		ApproxTransformer::new(context, tolerance)
	}

	/// Releases a context.
	fn destroy(&self, context: TransformContext) {
		drop(context);
	}
}
