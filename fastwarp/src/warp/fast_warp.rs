//! The warp entry point.
//!
//! One invocation runs a fixed sequence of stages: open the source, resolve
//! its CRS and geotransform, acquire a transform context, pick an overview,
//! clip the destination window, map destination pixels onto source blocks,
//! then read every block once and scatter its samples. Each stage fails with
//! its own [`WarpStatus`].

use super::{
	clip::clip_window,
	extent::{ReprojectExtent, measure_extent},
	mapper::map_pixels,
	overview::{apply_overview, downsampling_ratio, select_overview_level},
	reader::read_and_scatter,
};
use crate::{
	engine::{OpenRequest, RasterAccess, RasterBand, RasterDataset, Reprojection},
	transform::{SharedTransformCache, TransformContext, TransformContextCache, TransformKey},
};
use anyhow::{Context, Result, anyhow, ensure};
use fastwarp_core::{
	BlockGrid, BufferPool, DataType, DestinationWindow, GeoTransform, RasterType, WarpConfig, WarpError, WarpStage,
	WarpStatus, convert::fill_with_value,
};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
	fmt::Debug,
	ops::{Deref, DerefMut},
	sync::Arc,
	time::{Duration, Instant},
};

/// One warp of a single band onto a destination grid.
#[derive(Clone, Debug, PartialEq)]
pub struct WarpRequest {
	pub source_path: String,
	/// Overrides the dataset's CRS.
	pub source_crs: Option<String>,
	/// Overrides the dataset's geotransform.
	pub source_geo_transform: Option<GeoTransform>,
	/// Geolocation array options; replaces the source geotransform.
	pub geolocation: Option<Vec<String>>,
	/// Without a destination CRS, destination coordinates are taken to be in
	/// the source CRS.
	pub destination_crs: Option<String>,
	pub destination_geo_transform: GeoTransform,
	pub width: usize,
	pub height: usize,
	/// Band to warp, counted from 1.
	pub band: usize,
	/// Whether a subdataset should derive its CRS from CF conventions.
	pub srs_cf: bool,
}

impl WarpRequest {
	pub fn new(source_path: &str, destination_geo_transform: GeoTransform, width: usize, height: usize) -> Self {
		WarpRequest {
			source_path: source_path.to_string(),
			source_crs: None,
			source_geo_transform: None,
			geolocation: None,
			destination_crs: None,
			destination_geo_transform,
			width,
			height,
			band: 1,
			srs_cf: false,
		}
	}

	pub fn with_band(mut self, band: usize) -> Self {
		self.band = band;
		self
	}

	pub fn with_source_crs(mut self, crs: &str) -> Self {
		self.source_crs = Some(crs.to_string());
		self
	}

	pub fn with_source_geo_transform(mut self, geo_transform: GeoTransform) -> Self {
		self.source_geo_transform = Some(geo_transform);
		self
	}

	pub fn with_geolocation(mut self, options: Vec<String>) -> Self {
		self.geolocation = Some(options);
		self
	}

	pub fn with_destination_crs(mut self, crs: &str) -> Self {
		self.destination_crs = Some(crs.to_string());
		self
	}

	pub fn with_srs_cf(mut self, srs_cf: bool) -> Self {
		self.srs_cf = srs_cf;
		self
	}

	fn validate(&self) -> Result<()> {
		ensure!(
			self.width > 0 && self.height > 0,
			"destination size {}x{} is empty",
			self.width,
			self.height
		);
		ensure!(self.band > 0, "bands are counted from 1");
		ensure!(!self.source_path.is_empty(), "source path is empty");
		Ok(())
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WarpMetrics {
	/// Estimated as blocks read times the block size in bytes.
	pub bytes_read: usize,
	pub blocks_read: usize,
	pub blocks_failed: usize,
	pub pixels_mapped: usize,
	pub pixels_dropped: usize,
	/// Overview used instead of the full resolution band.
	pub overview_level: Option<usize>,
	/// Whether the transform context came from the cache.
	pub cached_transform: bool,
	pub elapsed: Duration,
}

/// The warped window of the destination grid.
#[derive(Clone, Debug, PartialEq)]
pub struct WarpOutput {
	/// Row-major samples of `window`, in native byte order.
	pub data: Vec<u8>,
	pub window: DestinationWindow,
	pub no_data: f64,
	pub raster_type: RasterType,
	pub metrics: WarpMetrics,
}

impl WarpOutput {
	/// Storage type of the samples in `data`.
	pub fn data_type(&self) -> DataType {
		self.raster_type.data_type()
	}
}

/// Nearest neighbour warper.
///
/// Clones share the transform cache, the scratch buffers and the block
/// reader threads.
#[derive(Clone)]
pub struct FastWarper {
	access: Arc<dyn RasterAccess>,
	engine: Arc<dyn Reprojection>,
	cache: SharedTransformCache,
	config: Arc<WarpConfig>,
	buffers: BufferPool,
	threads: Option<Arc<ThreadPool>>,
}

impl FastWarper {
	pub fn new(access: Arc<dyn RasterAccess>, engine: Arc<dyn Reprojection>, config: WarpConfig) -> Result<Self> {
		let cache = TransformContextCache::shared(engine.clone(), config.cache_capacity);
		FastWarper::with_cache(access, engine, cache, config)
	}

	/// Like [`FastWarper::new`], sharing an existing transform cache. The
	/// cache must release contexts through the same `engine`.
	pub fn with_cache(
		access: Arc<dyn RasterAccess>,
		engine: Arc<dyn Reprojection>,
		cache: SharedTransformCache,
		config: WarpConfig,
	) -> Result<Self> {
		config.validate().context("validating warp config")?;

		let workers = config.block_workers();
		let threads = if workers > 1 {
			let pool = ThreadPoolBuilder::new()
				.num_threads(workers)
				.thread_name(|i| format!("fastwarp-block-{i}"))
				.build()
				.context("building block reader threads")?;
			Some(Arc::new(pool))
		} else {
			None
		};
		log::debug!("created warper with {workers} block workers, {:?}", cache.lock());

		Ok(FastWarper {
			access,
			engine,
			cache,
			config: Arc::new(config),
			buffers: BufferPool::default(),
			threads,
		})
	}

	pub fn config(&self) -> &WarpConfig {
		&self.config
	}

	pub fn cache(&self) -> &SharedTransformCache {
		&self.cache
	}

	/// Warps one band of `request.source_path` onto the destination grid.
	pub fn warp(&self, request: &WarpRequest) -> Result<WarpOutput, WarpError> {
		let started = Instant::now();
		request
			.validate()
			.with_context(|| format!("invalid request for {:?}", request.source_path))
			.stage(WarpStatus::InvalidRequest)?;

		let (open_request, band_index) = self.open_request(request);
		let dataset = self
			.access
			.open(&open_request)
			.with_context(|| format!("opening {:?}", request.source_path))
			.stage(WarpStatus::OpenFailure)?;
		let band = dataset
			.band(band_index)
			.with_context(|| format!("selecting band {} of {:?}", request.band, request.source_path))
			.stage(WarpStatus::BandNotFound)?;

		let src_crs = self.source_crs(request, dataset.as_ref());
		let src_gt = request
			.source_geo_transform
			.or_else(|| dataset.geo_transform())
			.unwrap_or(GeoTransform::IDENTITY);

		let (mut context, cached_transform) = self
			.acquire_transform(request, &src_crs, &src_gt)
			.with_context(|| format!("creating transform for {:?}", request.source_path))
			.stage(WarpStatus::TransformFailure)?;

		let raster_size = dataset.raster_size();
		let suggested = match self.engine.suggest_output_window(raster_size, &context) {
			Ok(suggested) => Some(suggested),
			Err(err) => {
				log::debug!("no suggested output for {:?}: {err:#}", request.source_path);
				None
			}
		};

		let mut overview_level = None;
		if !context.is_geolocated()
			&& band.overview_count() > 0
			&& let Some(ratio) = suggested.as_ref().and_then(downsampling_ratio)
		{
			let widths = (0..band.overview_count())
				.map(|i| band.overview(i).map(|o| o.raster_size().0))
				.collect::<Result<Vec<_>>>()
				.context("listing overviews")
				.stage(WarpStatus::BandNotFound)?;
			overview_level = select_overview_level(raster_size.0, &widths, ratio, self.config.overview_tolerance);
		}

		let overview = overview_level
			.map(|i| band.overview(i))
			.transpose()
			.context("selecting overview")
			.stage(WarpStatus::BandNotFound)?;
		let selected: &dyn RasterBand = match &overview {
			Some(overview) => &**overview,
			None => &*band,
		};
		if let Some(level) = overview_level {
			apply_overview(&mut context, &src_gt, raster_size, selected.raster_size())
				.stage(WarpStatus::TransformFailure)?;
			log::debug!("reading overview {level} ({:?}) of {:?}", selected.raster_size(), request.source_path);
		}

		let window = clip_window(suggested.as_ref(), request.width, request.height);

		let grid = BlockGrid::new(selected.raster_size(), selected.block_size())
			.context("reading block layout")
			.stage(WarpStatus::BandNotFound)?;
		let approx = self.engine.create_approximation(&context, self.config.approx_tolerance);
		let mapping = map_pixels(&approx, &window, &grid)
			.context("mapping destination pixels")
			.stage(WarpStatus::TransformFailure)?;

		let source_type = selected.data_type();
		let output_type = source_type.output_type();
		let no_data = selected
			.no_data_value()
			.or_else(|| band.no_data_value())
			.unwrap_or(self.config.fallback_no_data);
		let mut data = vec![0u8; window.pixel_count() * output_type.size()];
		fill_with_value(&mut data, output_type, no_data);

		let stats = read_and_scatter(
			selected,
			&grid,
			&mapping,
			output_type,
			&mut data,
			&self.buffers,
			self.threads.as_deref(),
		)
		.with_context(|| format!("reading blocks of {:?}", request.source_path))
		.stage(WarpStatus::ReadFailure)?;

		let raster_type = if output_type == DataType::Byte && is_signed_byte(selected, &*band) {
			RasterType::SignedByte
		} else {
			RasterType::Data(output_type)
		};

		let metrics = WarpMetrics {
			bytes_read: stats.blocks_read * grid.block_byte_size(source_type.size()),
			blocks_read: stats.blocks_read,
			blocks_failed: stats.blocks_failed,
			pixels_mapped: mapping.mapped,
			pixels_dropped: mapping.dropped,
			overview_level,
			cached_transform,
			elapsed: started.elapsed(),
		};
		log::debug!("warped {:?} into {window:?}: {metrics:?}", request.source_path);

		Ok(WarpOutput {
			data,
			window,
			no_data,
			raster_type,
			metrics,
		})
	}

	/// Runs [`FastWarper::warp`] on tokio's blocking threads.
	pub async fn warp_async(&self, request: WarpRequest) -> Result<WarpOutput, WarpError> {
		let warper = self.clone();
		match tokio::task::spawn_blocking(move || warper.warp(&request)).await {
			Ok(result) => result,
			Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
			Err(err) => Err(WarpError::new(
				WarpStatus::InvalidRequest,
				anyhow!("warp task was cancelled: {err}"),
			)),
		}
	}

	/// Size of `bbox` (`[min_x, min_y, max_x, max_y]` in `dst_crs` units) at
	/// the native resolution of the source.
	pub fn compute_reproject_extent(
		&self,
		source_path: &str,
		dst_crs: &str,
		bbox: &[f64; 4],
	) -> Result<ReprojectExtent, WarpError> {
		if dst_crs.is_empty() {
			return Err(WarpError::new(
				WarpStatus::InvalidRequest,
				anyhow!("destination CRS is empty"),
			));
		}

		let dataset = self
			.access
			.open(&OpenRequest::new(source_path))
			.with_context(|| format!("opening {source_path:?}"))
			.stage(WarpStatus::OpenFailure)?;

		let src_crs = dataset
			.projection()
			.filter(|crs| !crs.is_empty())
			.unwrap_or_else(|| self.config.fallback_projection.clone());
		let src_gt = dataset.geo_transform().unwrap_or(GeoTransform::IDENTITY);

		let context = self
			.engine
			.create_transform_context(&src_crs, &src_gt, Some(dst_crs), &GeoTransform::IDENTITY)
			.with_context(|| format!("creating transform from {source_path:?} to {dst_crs:?}"))
			.stage(WarpStatus::TransformFailure)?;
		let context = OwnedContext::new(self.engine.as_ref(), context);

		let suggested = self
			.engine
			.suggest_output_window(dataset.raster_size(), &context)
			.with_context(|| format!("estimating resolution of {source_path:?} in {dst_crs:?}"))
			.stage(WarpStatus::TransformFailure)?;

		measure_extent(&suggested, bbox).stage(WarpStatus::InvalidRequest)
	}

	/// The open request for `request` and the band to use on the opened
	/// dataset. Subdatasets expose the requested band as band 1.
	fn open_request(&self, request: &WarpRequest) -> (OpenRequest, usize) {
		let subdataset = &self.config.subdataset;
		if !subdataset.matches(&request.source_path) {
			return (OpenRequest::new(&request.source_path), request.band);
		}

		let srs_cf = if request.srs_cf { "yes" } else { "no" };
		let open_request = OpenRequest {
			path: request.source_path.clone(),
			drivers: subdataset.drivers.clone(),
			options: vec![
				"md_query=no".to_string(),
				format!("band_query={}", request.band),
				format!("srs_cf={srs_cf}"),
			],
		};
		(open_request, 1)
	}

	fn source_crs(&self, request: &WarpRequest, dataset: &dyn RasterDataset) -> String {
		request
			.source_crs
			.clone()
			.filter(|crs| !crs.is_empty())
			.or_else(|| dataset.projection().filter(|crs| !crs.is_empty()))
			.unwrap_or_else(|| self.config.fallback_projection.clone())
	}

	/// Returns a context owned by the invocation and whether it was derived
	/// from a cached one.
	fn acquire_transform(
		&self,
		request: &WarpRequest,
		src_crs: &str,
		src_gt: &GeoTransform,
	) -> Result<(OwnedContext<'_>, bool)> {
		let engine = self.engine.as_ref();
		let dst_gt = &request.destination_geo_transform;
		let dst_crs = request.destination_crs.as_deref().filter(|crs| !crs.is_empty());

		if let Some(options) = &request.geolocation {
			let context = engine.create_geolocation_context(src_crs, options, dst_crs, dst_gt)?;
			return Ok((OwnedContext::new(engine, context), false));
		}

		let Some(dst_crs) = dst_crs else {
			let context = engine.create_transform_context(src_crs, src_gt, None, dst_gt)?;
			return Ok((OwnedContext::new(engine, context), false));
		};

		let key = TransformKey::new(src_crs, dst_crs)?;
		let hit = self.cache.lock().get(&key).map(|cached| cached.rebind(src_gt, dst_gt));
		if let Some(rebound) = hit {
			let context = rebound.context("rebinding cached transform")?;
			log::trace!("transform cache hit for {dst_crs:?}");
			return Ok((OwnedContext::new(engine, context), true));
		}

		let context = engine.create_transform_context(src_crs, src_gt, Some(dst_crs), dst_gt)?;
		if context.has_reprojection() {
			self.cache.lock().put(key, context.clone());
		}
		Ok((OwnedContext::new(engine, context), false))
	}
}

impl Debug for FastWarper {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FastWarper")
			.field("config", &self.config)
			.field("cache", &self.cache.lock())
			.field("block_workers", &self.threads.as_ref().map_or(1, |t| t.current_num_threads()))
			.finish_non_exhaustive()
	}
}

fn is_signed_byte(selected: &dyn RasterBand, full: &dyn RasterBand) -> bool {
	selected
		.metadata_item("PIXELTYPE", "IMAGE_STRUCTURE")
		.or_else(|| full.metadata_item("PIXELTYPE", "IMAGE_STRUCTURE"))
		.is_some_and(|v| v.eq_ignore_ascii_case("SIGNEDBYTE"))
}

/// A transform context owned by one invocation, released through the engine
/// when dropped.
struct OwnedContext<'a> {
	engine: &'a dyn Reprojection,
	context: Option<TransformContext>,
}

impl<'a> OwnedContext<'a> {
	fn new(engine: &'a dyn Reprojection, context: TransformContext) -> Self {
		OwnedContext {
			engine,
			context: Some(context),
		}
	}
}

impl Deref for OwnedContext<'_> {
	type Target = TransformContext;
	fn deref(&self) -> &TransformContext {
		self.context.as_ref().expect("context is only taken on drop")
	}
}

impl DerefMut for OwnedContext<'_> {
	fn deref_mut(&mut self) -> &mut TransformContext {
		self.context.as_mut().expect("context is only taken on drop")
	}
}

impl Drop for OwnedContext<'_> {
	fn drop(&mut self) {
		if let Some(context) = self.context.take() {
			self.engine.destroy(context);
		}
	}
}
