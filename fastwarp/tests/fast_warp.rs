//! End-to-end warps against in-memory rasters.

use anyhow::Result;
use fastwarp::{
	DataType, DestinationWindow, FastWarper, GeoTransform, RasterType, WarpConfig, WarpRequest, WarpStatus,
	engine::memory::{AffineReprojection, LinearTransform, MemoryBand, MemoryDataset, MemoryRasterAccess},
	transform::TransformContextCache,
};
use fastwarp_core::convert::read_sample;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;

fn scale(factor: f64) -> GeoTransform {
	GeoTransform::new([0.0, factor, 0.0, 0.0, 0.0, factor])
}

fn warper(access: &Arc<MemoryRasterAccess>, engine: &Arc<AffineReprojection>, workers: usize) -> FastWarper {
	let config = WarpConfig {
		block_workers: Some(workers),
		..WarpConfig::default()
	};
	FastWarper::new(access.clone(), engine.clone(), config).unwrap()
}

fn single(path: &str, dataset: MemoryDataset) -> (Arc<MemoryRasterAccess>, Arc<MemoryDataset>) {
	let access = Arc::new(MemoryRasterAccess::new());
	let dataset = access.insert(path, dataset);
	(access, dataset)
}

fn samples(data: &[u8], data_type: DataType) -> Vec<f64> {
	(0..data.len() / data_type.size())
		.map(|i| read_sample(data, data_type, i))
		.collect()
}

fn ramp(width: usize, height: usize, data_type: DataType) -> MemoryBand {
	MemoryBand::from_fn(width, height, data_type, move |x, y| (x + y * width) as f64)
}

#[test]
fn uniform_block_warps_in_one_read() -> Result<()> {
	let band = MemoryBand::filled(4, 4, DataType::Byte, 7.0).with_block_size(4, 4);
	let (access, dataset) = single("sevens", MemoryDataset::with_single_band(band));
	let engine = Arc::new(AffineReprojection::new());

	let output = warper(&access, &engine, 1).warp(&WarpRequest::new("sevens", GeoTransform::IDENTITY, 4, 4))?;

	assert_eq!(output.data, vec![7u8; 16]);
	assert_eq!(output.window, DestinationWindow::full(4, 4));
	assert_eq!(output.raster_type, RasterType::Data(DataType::Byte));
	assert_eq!(output.metrics.pixels_mapped, 16);
	assert_eq!(output.metrics.pixels_dropped, 0);
	assert_eq!(output.metrics.blocks_read, 1);
	assert_eq!(output.metrics.bytes_read, 16);
	assert_eq!(dataset.bands()[0].block_reads(), 1);
	Ok(())
}

#[test]
fn window_covers_only_the_source() -> Result<()> {
	let band = ramp(4, 4, DataType::Byte).with_no_data(255.0);
	let dataset = MemoryDataset::with_single_band(band).with_geo_transform(GeoTransform::new([2.0, 1.0, 0.0, 3.0, 0.0, 1.0]));
	let (access, _) = single("ramp", dataset);
	let engine = Arc::new(AffineReprojection::new());

	let output = warper(&access, &engine, 1).warp(&WarpRequest::new("ramp", GeoTransform::IDENTITY, 10, 10))?;

	// the maximum corner rounds up to include one extra pixel
	assert_eq!(output.window, DestinationWindow::new(2, 3, 5, 5));
	assert_eq!(output.no_data, 255.0);
	assert_eq!(output.metrics.pixels_mapped, 16);
	assert_eq!(output.metrics.pixels_dropped, 9);
	for row in 0..5 {
		for col in 0..5 {
			let expected = if row < 4 && col < 4 { (col + row * 4) as u8 } else { 255 };
			assert_eq!(output.data[row * 5 + col], expected, "pixel ({col}, {row})");
		}
	}
	Ok(())
}

#[test]
fn missing_no_data_uses_fallback() -> Result<()> {
	let (access, _) = single("ints", MemoryDataset::with_single_band(ramp(2, 2, DataType::Int32)));
	let engine = Arc::new(AffineReprojection::new());

	let output = warper(&access, &engine, 1).warp(&WarpRequest::new("ints", GeoTransform::IDENTITY, 4, 4))?;

	assert_eq!(output.no_data, -1e10);
	assert_eq!(output.data_type(), DataType::Float32);
	assert_eq!(output.window, DestinationWindow::new(0, 0, 3, 3));
	let values = samples(&output.data, DataType::Float32);
	let fill = f64::from(-1e10f64 as f32);
	assert_eq!(values, vec![0.0, 1.0, fill, 2.0, 3.0, fill, fill, fill, fill]);
	Ok(())
}

#[test]
fn float64_is_promoted_to_float32() -> Result<()> {
	let band = MemoryBand::from_fn(4, 4, DataType::Float64, |x, y| x as f64 * 0.5 - y as f64);
	let (access, _) = single("doubles", MemoryDataset::with_single_band(band));
	let engine = Arc::new(AffineReprojection::new());

	let output = warper(&access, &engine, 1).warp(&WarpRequest::new("doubles", GeoTransform::IDENTITY, 4, 4))?;

	assert_eq!(output.raster_type, RasterType::Data(DataType::Float32));
	assert_eq!(output.data.len(), 16 * 4);
	let values = samples(&output.data, DataType::Float32);
	assert_eq!(values[1], 0.5);
	assert_eq!(values[4 + 3], 0.5);
	assert_eq!(values[15], -1.5);
	Ok(())
}

#[test]
fn signed_byte_is_reported() -> Result<()> {
	let band = MemoryBand::filled(4, 4, DataType::Byte, 200.0).with_metadata("PIXELTYPE", "IMAGE_STRUCTURE", "SIGNEDBYTE");
	let (access, _) = single("signed", MemoryDataset::with_single_band(band));
	let engine = Arc::new(AffineReprojection::new());

	let output = warper(&access, &engine, 1).warp(&WarpRequest::new("signed", GeoTransform::IDENTITY, 4, 4))?;

	assert_eq!(output.raster_type, RasterType::SignedByte);
	assert_eq!(output.raster_type.code(), 100);
	assert_eq!(output.raster_type.name(), "SignedByte");
	assert_eq!(output.data_type(), DataType::Byte);
	assert_eq!(output.data, vec![200u8; 16]);
	Ok(())
}

#[test]
fn failed_blocks_leave_holes() -> Result<()> {
	let band = ramp(8, 4, DataType::Byte)
		.with_block_size(4, 4)
		.with_no_data(99.0)
		.with_failing_block(1, 0);
	let (access, _) = single("broken", MemoryDataset::with_single_band(band));
	let engine = Arc::new(AffineReprojection::new());

	let output = warper(&access, &engine, 1).warp(&WarpRequest::new("broken", GeoTransform::IDENTITY, 8, 4))?;

	assert_eq!(output.window, DestinationWindow::full(8, 4));
	assert_eq!(output.metrics.blocks_read, 1);
	assert_eq!(output.metrics.blocks_failed, 1);
	for row in 0..4 {
		let line = &output.data[row * 8..(row + 1) * 8];
		let left: Vec<u8> = (0..4).map(|col| (col + row * 8) as u8).collect();
		assert_eq!(line[..4], left[..]);
		assert_eq!(line[4..], [99u8; 4]);
	}
	Ok(())
}

#[test]
fn output_does_not_depend_on_workers() -> Result<()> {
	let band = ramp(37, 23, DataType::UInt16).with_block_size(8, 8).with_no_data(0.0);
	let (access, _) = single("ramp", MemoryDataset::with_single_band(band));
	let engine = Arc::new(AffineReprojection::new());
	let request = WarpRequest::new("ramp", scale(0.7), 60, 40);

	let reference = warper(&access, &engine, 1).warp(&request)?;
	assert_eq!(reference.window, DestinationWindow::new(0, 0, 54, 34));
	assert_eq!(reference.metrics.blocks_read, 15);

	for workers in [2, 4, 8] {
		let warper = warper(&access, &engine, workers);
		for _ in 0..2 {
			let output = warper.warp(&request)?;
			assert_eq!(output.window, reference.window);
			assert_eq!(output.data, reference.data);
			assert_eq!(output.metrics.blocks_read, reference.metrics.blocks_read);
		}
	}
	Ok(())
}

#[rstest]
#[case("NETCDF:\"data.nc\":temperature", false)]
#[case("data.nc", true)]
fn subdatasets_query_the_band(#[case] path: &str, #[case] srs_cf: bool) -> Result<()> {
	let dataset = MemoryDataset::new(4, 4)
		.with_driver("netCDF")
		.with_band(MemoryBand::filled(4, 4, DataType::Byte, 1.0))
		.with_band(MemoryBand::filled(4, 4, DataType::Byte, 2.0))
		.with_band(MemoryBand::filled(4, 4, DataType::Byte, 3.0));
	let (access, _) = single(path, dataset);
	let engine = Arc::new(AffineReprojection::new());

	let request = WarpRequest::new(path, GeoTransform::IDENTITY, 4, 4)
		.with_band(2)
		.with_srs_cf(srs_cf);
	let output = warper(&access, &engine, 1).warp(&request)?;
	assert_eq!(output.data, vec![2u8; 16]);

	let requests = access.requests();
	assert_eq!(requests.len(), 1);
	assert_eq!(requests[0].drivers, vec!["netCDF".to_string()]);
	assert_eq!(requests[0].option("md_query"), Some("no"));
	assert_eq!(requests[0].option("band_query"), Some("2"));
	assert_eq!(requests[0].option("srs_cf"), Some(if srs_cf { "yes" } else { "no" }));
	Ok(())
}

#[test]
fn plain_paths_open_without_options() -> Result<()> {
	let dataset = MemoryDataset::new(4, 4)
		.with_band(MemoryBand::filled(4, 4, DataType::Byte, 1.0))
		.with_band(MemoryBand::filled(4, 4, DataType::Byte, 3.0));
	let (access, _) = single("bands.tif", dataset);
	let engine = Arc::new(AffineReprojection::new());

	let request = WarpRequest::new("bands.tif", GeoTransform::IDENTITY, 4, 4).with_band(2);
	let output = warper(&access, &engine, 1).warp(&request)?;
	assert_eq!(output.data, vec![3u8; 16]);

	let requests = access.requests();
	assert!(requests[0].drivers.is_empty());
	assert!(requests[0].options.is_empty());
	Ok(())
}

fn projected_access() -> (Arc<MemoryRasterAccess>, Arc<AffineReprojection>) {
	let dataset = MemoryDataset::with_single_band(ramp(4, 4, DataType::Byte)).with_projection("EPSG:A");
	let (access, _) = single("projected", dataset);
	let engine = Arc::new(AffineReprojection::new().with_pair("EPSG:A", "EPSG:B", LinearTransform::new(scale(2.0)).unwrap()));
	(access, engine)
}

#[test]
fn second_invocation_hits_the_cache() -> Result<()> {
	let (access, engine) = projected_access();
	let warper = warper(&access, &engine, 1);
	let request = WarpRequest::new("projected", scale(2.0), 4, 4).with_destination_crs("EPSG:B");

	let first = warper.warp(&request)?;
	assert!(!first.metrics.cached_transform);
	assert_eq!(first.data, (0..16).collect::<Vec<u8>>());
	assert_eq!(engine.created(), 1);
	assert_eq!(warper.cache().lock().len(), 1);

	let second = warper.warp(&request)?;
	assert!(second.metrics.cached_transform);
	assert_eq!(second.data, first.data);
	assert_eq!(engine.created(), 1);

	// each invocation releases its own copy, the cache keeps one
	assert_eq!(engine.destroyed(), 2);
	drop(warper);
	assert_eq!(engine.destroyed(), 3);
	Ok(())
}

#[test]
fn cached_context_is_rebound_to_new_geotransforms() -> Result<()> {
	let (access, engine) = projected_access();
	let warper = warper(&access, &engine, 1);

	let full = warper.warp(&WarpRequest::new("projected", scale(2.0), 4, 4).with_destination_crs("EPSG:B"))?;
	let coarse = warper.warp(&WarpRequest::new("projected", scale(4.0), 2, 2).with_destination_crs("EPSG:B"))?;

	assert!(coarse.metrics.cached_transform);
	assert_eq!(full.window, DestinationWindow::full(4, 4));
	assert_eq!(coarse.window, DestinationWindow::full(2, 2));
	assert_eq!(coarse.data, vec![5, 7, 13, 15]);
	Ok(())
}

#[test]
fn equivalent_crs_is_not_cached() -> Result<()> {
	let (access, engine) = projected_access();
	let warper = warper(&access, &engine, 1);
	let request = WarpRequest::new("projected", GeoTransform::IDENTITY, 4, 4).with_destination_crs("EPSG:A");

	for _ in 0..2 {
		let output = warper.warp(&request)?;
		assert!(!output.metrics.cached_transform);
	}
	assert!(warper.cache().lock().is_empty());
	assert_eq!(engine.created(), 0);
	Ok(())
}

#[test]
fn warpers_share_a_cache() -> Result<()> {
	let (access, engine) = projected_access();
	let cache = TransformContextCache::shared(engine.clone(), 16);
	let first = FastWarper::with_cache(access.clone(), engine.clone(), cache.clone(), WarpConfig::default())?;
	let second = FastWarper::with_cache(access.clone(), engine.clone(), cache.clone(), WarpConfig::default())?;
	let request = WarpRequest::new("projected", scale(2.0), 4, 4).with_destination_crs("EPSG:B");

	assert!(!first.warp(&request)?.metrics.cached_transform);
	assert!(second.warp(&request)?.metrics.cached_transform);
	assert_eq!(engine.created(), 1);
	Ok(())
}

fn pyramid() -> (Arc<MemoryRasterAccess>, Arc<AffineReprojection>) {
	let band = MemoryBand::filled(16, 16, DataType::Byte, 1.0)
		.with_block_size(16, 16)
		.with_overview(MemoryBand::filled(8, 8, DataType::Byte, 2.0).with_block_size(8, 8))
		.with_overview(MemoryBand::filled(4, 4, DataType::Byte, 3.0).with_block_size(4, 4));
	let (access, _) = single("pyramid", MemoryDataset::with_single_band(band));
	(access, Arc::new(AffineReprojection::new()))
}

#[test]
fn downsampling_reads_matching_overview() -> Result<()> {
	let (access, engine) = pyramid();
	let output = warper(&access, &engine, 1).warp(&WarpRequest::new("pyramid", scale(4.0), 4, 4))?;

	assert_eq!(output.metrics.overview_level, Some(1));
	assert_eq!(output.data, vec![3u8; 16]);
	assert_eq!(output.metrics.blocks_read, 1);
	Ok(())
}

#[test]
fn downsampling_picks_finer_bracketing_overview() -> Result<()> {
	let (access, engine) = pyramid();
	let output = warper(&access, &engine, 1).warp(&WarpRequest::new("pyramid", scale(3.0), 6, 6))?;

	assert_eq!(output.metrics.overview_level, Some(0));
	assert_eq!(output.window, DestinationWindow::full(6, 6));
	assert_eq!(output.data[0], 2);
	assert_eq!(output.data[4 * 6 + 4], 2);
	Ok(())
}

#[test]
fn full_resolution_without_downsampling() -> Result<()> {
	let (access, engine) = pyramid();
	let output = warper(&access, &engine, 1).warp(&WarpRequest::new("pyramid", GeoTransform::IDENTITY, 16, 16))?;

	assert_eq!(output.metrics.overview_level, None);
	assert_eq!(output.data, vec![1u8; 256]);
	Ok(())
}

#[test]
fn geolocated_sources_skip_overviews() -> Result<()> {
	let (access, _) = pyramid();
	let engine = Arc::new(AffineReprojection::new().with_geolocation(LinearTransform::identity()));
	let request = WarpRequest::new("pyramid", scale(4.0), 4, 4).with_geolocation(vec!["X_DATASET=lon".to_string()]);

	let output = warper(&access, &engine, 1).warp(&request)?;

	assert_eq!(output.metrics.overview_level, None);
	assert!(!output.metrics.cached_transform);
	assert_eq!(output.data, vec![1u8; 16]);
	assert_eq!(engine.destroyed(), 1);
	Ok(())
}

#[rstest]
#[case(WarpRequest::new("sevens", GeoTransform::IDENTITY, 0, 4), WarpStatus::InvalidRequest)]
#[case(WarpRequest::new("sevens", GeoTransform::IDENTITY, 4, 4).with_band(0), WarpStatus::InvalidRequest)]
#[case(WarpRequest::new("missing", GeoTransform::IDENTITY, 4, 4), WarpStatus::OpenFailure)]
#[case(WarpRequest::new("sevens.nc", GeoTransform::IDENTITY, 4, 4), WarpStatus::OpenFailure)]
#[case(WarpRequest::new("sevens", GeoTransform::IDENTITY, 4, 4).with_band(2), WarpStatus::BandNotFound)]
#[case(WarpRequest::new("sevens", GeoTransform::new([0.0; 6]), 4, 4), WarpStatus::TransformFailure)]
#[case(
	WarpRequest::new("sevens", GeoTransform::IDENTITY, 4, 4).with_destination_crs("EPSG:unknown"),
	WarpStatus::TransformFailure
)]
#[case(
	WarpRequest::new("sevens", GeoTransform::IDENTITY, 4, 4).with_source_geo_transform(GeoTransform::new([0.0; 6])),
	WarpStatus::TransformFailure
)]
#[case(
	WarpRequest::new("sevens", GeoTransform::IDENTITY, 4, 4).with_geolocation(vec!["X_DATASET=lon".to_string()]),
	WarpStatus::TransformFailure
)]
fn failures_report_their_status(#[case] request: WarpRequest, #[case] status: WarpStatus) {
	let access = Arc::new(MemoryRasterAccess::new());
	access.insert("sevens", MemoryDataset::with_single_band(MemoryBand::filled(4, 4, DataType::Byte, 7.0)));
	access.insert("sevens.nc", MemoryDataset::with_single_band(MemoryBand::filled(4, 4, DataType::Byte, 7.0)));
	let engine = Arc::new(AffineReprojection::new());

	let err = warper(&access, &engine, 1).warp(&request).unwrap_err();
	assert_eq!(err.status(), status);
	assert_eq!(err.code(), status.code());
}

#[test]
fn untransformable_pixels_keep_no_data() -> Result<()> {
	let band = MemoryBand::filled(8, 8, DataType::Byte, 5.0).with_no_data(99.0);
	let (access, _) = single("partial", MemoryDataset::with_single_band(band).with_projection("EPSG:A"));
	// the CRS pair only covers source x in [0, 4]
	let engine = Arc::new(
		AffineReprojection::new().with_pair("EPSG:A", "EPSG:B", LinearTransform::identity().with_domain([0.0, 0.0, 4.0, 8.0])),
	);
	let request = WarpRequest::new("partial", GeoTransform::IDENTITY, 8, 8).with_destination_crs("EPSG:B");

	let output = warper(&access, &engine, 1).warp(&request)?;

	assert_eq!(output.window, DestinationWindow::new(0, 0, 5, 8));
	assert_eq!(output.no_data, 99.0);
	assert_eq!(output.metrics.pixels_mapped, 32);
	assert_eq!(output.metrics.pixels_dropped, 8);
	for row in output.data.chunks(5) {
		assert_eq!(row, [5, 5, 5, 5, 99]);
	}
	Ok(())
}

#[test]
fn unreadable_sample_type_is_a_read_failure() {
	let band = MemoryBand::filled(4, 4, DataType::Unknown, 0.0).with_block_size(4, 4);
	let (access, dataset) = single("opaque", MemoryDataset::with_single_band(band));
	let engine = Arc::new(AffineReprojection::new());

	let result = warper(&access, &engine, 1).warp(&WarpRequest::new("opaque", GeoTransform::IDENTITY, 4, 4));

	assert_eq!(WarpStatus::of(&result), WarpStatus::ReadFailure);
	assert_eq!(result.unwrap_err().code(), 5);
	assert_eq!(dataset.bands()[0].block_reads(), 0);
}

#[tokio::test]
async fn async_warp_matches_blocking() -> Result<()> {
	let (access, engine) = projected_access();
	let warper = warper(&access, &engine, 2);
	let request = WarpRequest::new("projected", scale(2.0), 4, 4).with_destination_crs("EPSG:B");

	let blocking = warper.warp(&request)?;
	let output = warper.warp_async(request).await?;
	assert_eq!(output.data, blocking.data);
	assert_eq!(output.window, blocking.window);
	assert!(output.metrics.cached_transform);
	Ok(())
}

#[test]
fn reproject_extent_uses_native_resolution() -> Result<()> {
	let dataset = MemoryDataset::with_single_band(MemoryBand::new(10, 10, DataType::Byte)).with_projection("EPSG:A");
	let (access, _) = single("grid", dataset);
	let engine = Arc::new(AffineReprojection::new().with_pair("EPSG:A", "EPSG:B", LinearTransform::new(scale(2.0))?));
	let warper = warper(&access, &engine, 1);

	let extent = warper.compute_reproject_extent("grid", "EPSG:B", &[0.0, 0.0, 100.0, 50.0])?;
	assert_eq!((extent.pixels, extent.lines), (50, 25));
	assert_eq!((extent.x_resolution, extent.y_resolution), (2.0, 2.0));

	let err = warper.compute_reproject_extent("grid", "", &[0.0; 4]).unwrap_err();
	assert_eq!(err.status(), WarpStatus::InvalidRequest);
	let err = warper.compute_reproject_extent("nowhere", "EPSG:B", &[0.0; 4]).unwrap_err();
	assert_eq!(err.status(), WarpStatus::OpenFailure);
	let err = warper.compute_reproject_extent("grid", "EPSG:C", &[0.0; 4]).unwrap_err();
	assert_eq!(err.status(), WarpStatus::TransformFailure);
	Ok(())
}

#[test]
fn config_from_yaml() -> Result<()> {
	let config = WarpConfig::from_string("cache_capacity: 8\nblock_workers: 2\n")?;
	let access = Arc::new(MemoryRasterAccess::new());
	let warper = FastWarper::new(access, Arc::new(AffineReprojection::new()), config)?;
	assert_eq!(warper.cache().lock().capacity(), 8);
	assert_eq!(warper.config().block_workers(), 2);

	let invalid = WarpConfig {
		cache_capacity: 0,
		..WarpConfig::default()
	};
	assert!(FastWarper::new(Arc::new(MemoryRasterAccess::new()), Arc::new(AffineReprojection::new()), invalid).is_err());
	Ok(())
}
