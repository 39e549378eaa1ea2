//! In-memory rasters and linear CRS pairs.
//!
//! Useful for embedders that already hold decoded rasters, and for tests:
//! bands count their block reads and can be told to fail on given blocks, the
//! reprojection counts created and destroyed transforms.

use super::{Direction, OpenRequest, PointTransform, RasterAccess, RasterBand, RasterDataset, Reprojection};
use crate::transform::TransformContext;
use anyhow::{Context, Result, anyhow, bail, ensure};
use fastwarp_core::{
	DataType, GeoTransform,
	convert::{read_sample, write_sample},
};
use parking_lot::Mutex;
use std::{
	collections::{HashMap, HashSet},
	fmt::Debug,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};

/// A raster band held in memory, stored row-major in native byte order.
pub struct MemoryBand {
	width: usize,
	height: usize,
	block_width: usize,
	block_height: usize,
	data_type: DataType,
	data: Vec<u8>,
	no_data: Option<f64>,
	overviews: Vec<MemoryBand>,
	metadata: HashMap<(String, String), String>,
	failing_blocks: HashSet<(usize, usize)>,
	block_reads: AtomicUsize,
}

impl MemoryBand {
	/// A zero-filled band, tiled in whole-row strips.
	pub fn new(width: usize, height: usize, data_type: DataType) -> Self {
		MemoryBand {
			width,
			height,
			block_width: width.max(1),
			block_height: 1,
			data_type,
			data: vec![0u8; width * height * data_type.size()],
			no_data: None,
			overviews: Vec::new(),
			metadata: HashMap::new(),
			failing_blocks: HashSet::new(),
			block_reads: AtomicUsize::new(0),
		}
	}

	/// A band whose sample at `(x, y)` is `f(x, y)`.
	pub fn from_fn(width: usize, height: usize, data_type: DataType, f: impl Fn(usize, usize) -> f64) -> Self {
		let mut band = MemoryBand::new(width, height, data_type);
		for y in 0..height {
			for x in 0..width {
				write_sample(&mut band.data, data_type, y * width + x, f(x, y));
			}
		}
		band
	}

	pub fn filled(width: usize, height: usize, data_type: DataType, value: f64) -> Self {
		MemoryBand::from_fn(width, height, data_type, |_, _| value)
	}

	pub fn with_block_size(mut self, block_width: usize, block_height: usize) -> Self {
		self.block_width = block_width.max(1);
		self.block_height = block_height.max(1);
		self
	}

	pub fn with_no_data(mut self, no_data: f64) -> Self {
		self.no_data = Some(no_data);
		self
	}

	pub fn with_overview(mut self, overview: MemoryBand) -> Self {
		self.overviews.push(overview);
		self
	}

	pub fn with_metadata(mut self, key: &str, domain: &str, value: &str) -> Self {
		self.metadata
			.insert((domain.to_string(), key.to_string()), value.to_string());
		self
	}

	/// Makes reads of block `(x_block, y_block)` fail.
	pub fn with_failing_block(mut self, x_block: usize, y_block: usize) -> Self {
		self.failing_blocks.insert((x_block, y_block));
		self
	}

	pub fn value(&self, x: usize, y: usize) -> f64 {
		read_sample(&self.data, self.data_type, y * self.width + x)
	}

	/// Number of successful block reads so far.
	pub fn block_reads(&self) -> usize {
		self.block_reads.load(Ordering::Relaxed)
	}

	pub fn overviews(&self) -> &[MemoryBand] {
		&self.overviews
	}
}

impl RasterBand for MemoryBand {
	fn raster_size(&self) -> (usize, usize) {
		(self.width, self.height)
	}

	fn block_size(&self) -> (usize, usize) {
		(self.block_width, self.block_height)
	}

	fn data_type(&self) -> DataType {
		self.data_type
	}

	fn no_data_value(&self) -> Option<f64> {
		self.no_data
	}

	fn overview_count(&self) -> usize {
		self.overviews.len()
	}

	fn overview(&self, index: usize) -> Result<Box<dyn RasterBand + '_>> {
		let overview = self
			.overviews
			.get(index)
			.ok_or_else(|| anyhow!("overview {index} does not exist, band has {}", self.overviews.len()))?;
		Ok(Box::new(overview))
	}

	fn read_block(&self, x_block: usize, y_block: usize, buffer: &mut [u8]) -> Result<()> {
		let size = self.data_type.size();
		let x0 = x_block * self.block_width;
		let y0 = y_block * self.block_height;
		ensure!(
			x0 < self.width && y0 < self.height,
			"block ({x_block}, {y_block}) is outside the raster"
		);
		ensure!(
			buffer.len() >= self.block_width * self.block_height * size,
			"block buffer of {} bytes is too small",
			buffer.len()
		);
		if self.failing_blocks.contains(&(x_block, y_block)) {
			bail!("simulated read failure of block ({x_block}, {y_block})");
		}

		let columns = self.block_width.min(self.width - x0);
		let rows = self.block_height.min(self.height - y0);
		buffer.fill(0);
		for row in 0..rows {
			let src = ((y0 + row) * self.width + x0) * size;
			let dst = row * self.block_width * size;
			buffer[dst..dst + columns * size].copy_from_slice(&self.data[src..src + columns * size]);
		}
		self.block_reads.fetch_add(1, Ordering::Relaxed);
		Ok(())
	}

	fn metadata_item(&self, key: &str, domain: &str) -> Option<String> {
		self.metadata.get(&(domain.to_string(), key.to_string())).cloned()
	}
}

impl Debug for MemoryBand {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryBand")
			.field("size", &(self.width, self.height))
			.field("block_size", &(self.block_width, self.block_height))
			.field("data_type", &self.data_type)
			.field("overviews", &self.overviews.len())
			.finish_non_exhaustive()
	}
}

/// A dataset of in-memory bands.
#[derive(Debug)]
pub struct MemoryDataset {
	width: usize,
	height: usize,
	driver: String,
	projection: Option<String>,
	geo_transform: Option<GeoTransform>,
	bands: Vec<MemoryBand>,
}

impl MemoryDataset {
	pub fn new(width: usize, height: usize) -> Self {
		MemoryDataset {
			width,
			height,
			driver: "MEM".to_string(),
			projection: None,
			geo_transform: None,
			bands: Vec::new(),
		}
	}

	/// A dataset holding a single band, sized to it.
	pub fn with_single_band(band: MemoryBand) -> Self {
		let (width, height) = band.raster_size();
		MemoryDataset::new(width, height).with_band(band)
	}

	pub fn with_band(mut self, band: MemoryBand) -> Self {
		self.bands.push(band);
		self
	}

	pub fn with_projection(mut self, projection: &str) -> Self {
		self.projection = Some(projection.to_string());
		self
	}

	pub fn with_geo_transform(mut self, geo_transform: GeoTransform) -> Self {
		self.geo_transform = Some(geo_transform);
		self
	}

	/// Name of the driver that "owns" this dataset, checked against
	/// [`OpenRequest::drivers`].
	pub fn with_driver(mut self, driver: &str) -> Self {
		self.driver = driver.to_string();
		self
	}

	pub fn bands(&self) -> &[MemoryBand] {
		&self.bands
	}
}

/// An opened [`MemoryDataset`]. With a `band_query` open option only the
/// queried band is visible, as band 1.
struct MemoryDatasetView {
	dataset: Arc<MemoryDataset>,
	band_query: Option<usize>,
}

impl RasterDataset for MemoryDatasetView {
	fn raster_size(&self) -> (usize, usize) {
		(self.dataset.width, self.dataset.height)
	}

	fn projection(&self) -> Option<String> {
		self.dataset.projection.clone()
	}

	fn geo_transform(&self) -> Option<GeoTransform> {
		self.dataset.geo_transform
	}

	fn band_count(&self) -> usize {
		if self.band_query.is_some() {
			1
		} else {
			self.dataset.bands.len()
		}
	}

	fn band(&self, index: usize) -> Result<Box<dyn RasterBand + '_>> {
		let position = match self.band_query {
			Some(query) if index == 1 => query,
			Some(_) => bail!("band {index} does not exist, dataset has 1 band"),
			None => index,
		};
		let band = position
			.checked_sub(1)
			.and_then(|i| self.dataset.bands.get(i))
			.ok_or_else(|| anyhow!("band {index} does not exist, dataset has {} bands", self.band_count()))?;
		Ok(Box::new(band))
	}
}

/// Registry of in-memory datasets, opened by path.
#[derive(Debug, Default)]
pub struct MemoryRasterAccess {
	datasets: Mutex<HashMap<String, Arc<MemoryDataset>>>,
	requests: Mutex<Vec<OpenRequest>>,
}

impl MemoryRasterAccess {
	pub fn new() -> Self {
		MemoryRasterAccess::default()
	}

	/// Registers `dataset` under `path` and returns a handle for inspection.
	pub fn insert(&self, path: &str, dataset: MemoryDataset) -> Arc<MemoryDataset> {
		let dataset = Arc::new(dataset);
		self.datasets.lock().insert(path.to_string(), dataset.clone());
		dataset
	}

	/// Every request seen by [`RasterAccess::open`], in order.
	pub fn requests(&self) -> Vec<OpenRequest> {
		self.requests.lock().clone()
	}
}

impl RasterAccess for MemoryRasterAccess {
	fn open(&self, request: &OpenRequest) -> Result<Box<dyn RasterDataset>> {
		self.requests.lock().push(request.clone());

		let dataset = self
			.datasets
			.lock()
			.get(&request.path)
			.cloned()
			.ok_or_else(|| anyhow!("no dataset registered at {:?}", request.path))?;

		if !request.drivers.is_empty() && !request.drivers.iter().any(|d| d.eq_ignore_ascii_case(&dataset.driver)) {
			bail!(
				"driver {:?} of {:?} is not among {:?}",
				dataset.driver,
				request.path,
				request.drivers
			);
		}

		let band_query = request
			.option("band_query")
			.map(|v| v.parse::<usize>())
			.transpose()
			.context("parsing band_query open option")?;

		log::trace!("opened memory dataset {:?} (band_query {band_query:?})", request.path);
		Ok(Box::new(MemoryDatasetView { dataset, band_query }))
	}
}

/// An affine map between two coordinate systems, optionally restricted to a
/// domain of valid source coordinates.
#[derive(Clone, Debug)]
pub struct LinearTransform {
	forward: GeoTransform,
	inverse: GeoTransform,
	domain: Option<[f64; 4]>,
}

impl LinearTransform {
	/// `forward` maps source `(x, y)` to destination `(x, y)`.
	pub fn new(forward: GeoTransform) -> Result<Self> {
		let inverse = forward.try_invert()?;
		Ok(LinearTransform {
			forward,
			inverse,
			domain: None,
		})
	}

	pub fn identity() -> Self {
		LinearTransform {
			forward: GeoTransform::IDENTITY,
			inverse: GeoTransform::IDENTITY,
			domain: None,
		}
	}

	/// Points whose source coordinates fall outside `[min_x, min_y, max_x,
	/// max_y]` fail to transform.
	pub fn with_domain(mut self, domain: [f64; 4]) -> Self {
		self.domain = Some(domain);
		self
	}

	pub fn inverted(&self) -> Self {
		LinearTransform {
			forward: self.inverse,
			inverse: self.forward,
			domain: self.domain.map(|d| {
				let corners = [(d[0], d[1]), (d[0], d[3]), (d[2], d[1]), (d[2], d[3])].map(|(x, y)| self.forward.apply(x, y));
				corners.iter().fold(
					[f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
					|e, (x, y)| [e[0].min(*x), e[1].min(*y), e[2].max(*x), e[3].max(*y)],
				)
			}),
		}
	}

	fn in_domain(&self, x: f64, y: f64) -> bool {
		match self.domain {
			Some([min_x, min_y, max_x, max_y]) => x >= min_x && x <= max_x && y >= min_y && y <= max_y,
			None => true,
		}
	}
}

impl PointTransform for LinearTransform {
	fn transform(
		&self,
		direction: Direction,
		xs: &mut [f64],
		ys: &mut [f64],
		_zs: &mut [f64],
		success: &mut [bool],
	) -> Result<()> {
		for ((x, y), ok) in xs.iter_mut().zip(ys.iter_mut()).zip(success.iter_mut()) {
			match direction {
				Direction::SourceToDestination => {
					*ok = self.in_domain(*x, *y);
					(*x, *y) = self.forward.apply(*x, *y);
				}
				Direction::DestinationToSource => {
					(*x, *y) = self.inverse.apply(*x, *y);
					*ok = self.in_domain(*x, *y);
				}
			}
		}
		Ok(())
	}
}

/// Reprojection between registered CRS pairs, each a [`LinearTransform`].
///
/// Identical CRS strings need no transform. A pair registered one way also
/// works the other way.
#[derive(Debug, Default)]
pub struct AffineReprojection {
	pairs: HashMap<(String, String), LinearTransform>,
	geolocation: Option<LinearTransform>,
	created: AtomicUsize,
	destroyed: AtomicUsize,
}

impl AffineReprojection {
	pub fn new() -> Self {
		AffineReprojection::default()
	}

	pub fn with_pair(mut self, src_crs: &str, dst_crs: &str, transform: LinearTransform) -> Self {
		self.pairs.insert((src_crs.to_string(), dst_crs.to_string()), transform);
		self
	}

	/// Transform used for any set of geolocation options, mapping source
	/// pixel/line to geolocation coordinates.
	pub fn with_geolocation(mut self, transform: LinearTransform) -> Self {
		self.geolocation = Some(transform);
		self
	}

	/// Number of CRS transforms created so far.
	pub fn created(&self) -> usize {
		self.created.load(Ordering::Relaxed)
	}

	/// Number of contexts destroyed so far.
	pub fn destroyed(&self) -> usize {
		self.destroyed.load(Ordering::Relaxed)
	}
}

impl Reprojection for AffineReprojection {
	fn create_crs_transform(&self, src_crs: &str, dst_crs: &str) -> Result<Option<Arc<dyn PointTransform>>> {
		ensure!(!src_crs.is_empty() && !dst_crs.is_empty(), "CRS definitions must not be empty");
		if src_crs == dst_crs {
			return Ok(None);
		}

		let key = (src_crs.to_string(), dst_crs.to_string());
		let transform = if let Some(t) = self.pairs.get(&key) {
			t.clone()
		} else if let Some(t) = self.pairs.get(&(key.1, key.0)) {
			t.inverted()
		} else {
			bail!("no transformation from {src_crs:?} to {dst_crs:?}");
		};

		self.created.fetch_add(1, Ordering::Relaxed);
		Ok(Some(Arc::new(transform)))
	}

	fn create_geolocation_transform(&self, options: &[String]) -> Result<Arc<dyn PointTransform>> {
		ensure!(!options.is_empty(), "geolocation options are empty");
		let transform = self
			.geolocation
			.clone()
			.ok_or_else(|| anyhow!("no geolocation arrays for {options:?}"))?;
		Ok(Arc::new(transform))
	}

	fn destroy(&self, context: TransformContext) {
		self.destroyed.fetch_add(1, Ordering::Relaxed);
		drop(context);
	}
}
