use crate::engine::{OpenRequest, RasterAccess, RasterBand, RasterDataset};
use anyhow::{Context, Result, bail, ensure};
use fastwarp_core::{DataType, GeoTransform};
use gdal::{Dataset, DatasetOptions, GdalOpenFlags, Metadata};
use parking_lot::Mutex;
use std::{fmt::Debug, sync::Arc};

/// Opens datasets through GDAL's driver registry.
#[derive(Debug, Default)]
pub struct GdalRasterAccess;

impl GdalRasterAccess {
	pub fn new() -> Self {
		GdalRasterAccess
	}
}

impl RasterAccess for GdalRasterAccess {
	fn open(&self, request: &OpenRequest) -> Result<Box<dyn RasterDataset>> {
		let drivers: Vec<&str> = request.drivers.iter().map(String::as_str).collect();
		let options: Vec<&str> = request.options.iter().map(String::as_str).collect();
		let dataset = Dataset::open_ex(
			&request.path,
			DatasetOptions {
				open_flags: GdalOpenFlags::GDAL_OF_READONLY | GdalOpenFlags::GDAL_OF_RASTER,
				allowed_drivers: (!drivers.is_empty()).then_some(drivers.as_slice()),
				open_options: (!options.is_empty()).then_some(options.as_slice()),
				sibling_files: None,
			},
		)
		.with_context(|| format!("GDAL failed to open {:?}", request.path))?;

		log::trace!(
			"opened GDAL dataset {:?} ({}x{}, bands={})",
			request.path,
			dataset.raster_size().0,
			dataset.raster_size().1,
			dataset.raster_count()
		);
		Ok(Box::new(GdalDataset::new(dataset)))
	}
}

/// An opened GDAL dataset.
pub struct GdalDataset {
	dataset: Dataset,
	lock: Arc<Mutex<()>>,
}

unsafe impl Send for GdalDataset {}
unsafe impl Sync for GdalDataset {}

impl GdalDataset {
	pub fn new(dataset: Dataset) -> Self {
		GdalDataset {
			dataset,
			lock: Arc::new(Mutex::new(())),
		}
	}
}

impl RasterDataset for GdalDataset {
	fn raster_size(&self) -> (usize, usize) {
		self.dataset.raster_size()
	}

	fn projection(&self) -> Option<String> {
		let projection = self.dataset.projection();
		(!projection.is_empty()).then_some(projection)
	}

	fn geo_transform(&self) -> Option<GeoTransform> {
		self.dataset.geo_transform().ok().map(GeoTransform::new)
	}

	fn band_count(&self) -> usize {
		self.dataset.raster_count()
	}

	fn band(&self, index: usize) -> Result<Box<dyn RasterBand + '_>> {
		ensure!(
			index >= 1 && index <= self.band_count(),
			"band {index} does not exist, dataset has {} bands",
			self.band_count()
		);
		let band = self.dataset.rasterband(index)?;
		Ok(Box::new(GdalBand::new(band, self.lock.clone())?))
	}
}

impl Debug for GdalDataset {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GdalDataset")
			.field("size", &self.dataset.raster_size())
			.field("bands", &self.dataset.raster_count())
			.finish_non_exhaustive()
	}
}

/// A band or overview of a [`GdalDataset`].
pub struct GdalBand<'a> {
	band: gdal::raster::RasterBand<'a>,
	data_type: DataType,
	lock: Arc<Mutex<()>>,
}

unsafe impl Send for GdalBand<'_> {}
unsafe impl Sync for GdalBand<'_> {}

impl<'a> GdalBand<'a> {
	fn new(band: gdal::raster::RasterBand<'a>, lock: Arc<Mutex<()>>) -> Result<Self> {
		let code = unsafe { gdal_sys::GDALGetRasterDataType(band.c_rasterband()) };
		let data_type = DataType::from_code(code).context("reading band data type")?;
		Ok(GdalBand { band, data_type, lock })
	}
}

impl RasterBand for GdalBand<'_> {
	fn raster_size(&self) -> (usize, usize) {
		self.band.size()
	}

	fn block_size(&self) -> (usize, usize) {
		self.band.block_size()
	}

	fn data_type(&self) -> DataType {
		self.data_type
	}

	fn no_data_value(&self) -> Option<f64> {
		self.band.no_data_value()
	}

	fn overview_count(&self) -> usize {
		self.band
			.overview_count()
			.ok()
			.and_then(|count| usize::try_from(count).ok())
			.unwrap_or(0)
	}

	fn overview(&self, index: usize) -> Result<Box<dyn RasterBand + '_>> {
		let overview = self
			.band
			.overview(index)
			.with_context(|| format!("reading overview {index}"))?;
		Ok(Box::new(GdalBand::new(overview, self.lock.clone())?))
	}

	fn read_block(&self, x_block: usize, y_block: usize, buffer: &mut [u8]) -> Result<()> {
		let (block_width, block_height) = self.band.block_size();
		let needed = block_width * block_height * self.data_type.size();
		ensure!(
			buffer.len() >= needed,
			"block buffer of {} bytes is too small, need {needed}",
			buffer.len()
		);
		let x = i32::try_from(x_block)?;
		let y = i32::try_from(y_block)?;

		let _guard = self.lock.lock();
		let result =
			unsafe { gdal_sys::GDALReadBlock(self.band.c_rasterband(), x, y, buffer.as_mut_ptr().cast::<std::ffi::c_void>()) };
		if result != gdal_sys::CPLErr::CE_None {
			bail!("GDAL failed to read block ({x_block}, {y_block})");
		}
		Ok(())
	}

	fn metadata_item(&self, key: &str, domain: &str) -> Option<String> {
		self.band.metadata_item(key, domain)
	}
}
