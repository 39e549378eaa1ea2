use crate::engine::{Direction, PointTransform, Reprojection};
use anyhow::{Context, Result, anyhow, ensure};
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use parking_lot::Mutex;
use std::{
	ffi::{CString, c_char, c_int, c_void},
	ptr,
	sync::Arc,
};

/// Reprojection through OGR coordinate transformations and GDAL geolocation
/// transformers.
#[derive(Debug, Default)]
pub struct GdalReprojection;

impl GdalReprojection {
	pub fn new() -> Self {
		GdalReprojection
	}
}

fn spatial_ref(definition: &str) -> Result<SpatialRef> {
	let mut srs = SpatialRef::from_definition(definition)
		.map_err(|e| anyhow!("failed to parse spatial reference {definition:?}: {e}"))?;
	srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
	Ok(srs)
}

impl Reprojection for GdalReprojection {
	fn create_crs_transform(&self, src_crs: &str, dst_crs: &str) -> Result<Option<Arc<dyn PointTransform>>> {
		let src = spatial_ref(src_crs)?;
		let dst = spatial_ref(dst_crs)?;
		if src == dst {
			log::trace!("source and destination CRS are equivalent");
			return Ok(None);
		}

		let forward = CoordTransform::new(&src, &dst).context("creating forward coordinate transformation")?;
		let inverse = CoordTransform::new(&dst, &src).context("creating inverse coordinate transformation")?;
		log::debug!("created coordinate transformation {src_crs:?} -> {dst_crs:?}");
		Ok(Some(Arc::new(CrsTransform {
			forward: Mutex::new(forward),
			inverse: Mutex::new(inverse),
		})))
	}

	fn create_geolocation_transform(&self, options: &[String]) -> Result<Arc<dyn PointTransform>> {
		ensure!(!options.is_empty(), "geolocation options are empty");
		let strings = options
			.iter()
			.map(|o| CString::new(o.as_str()))
			.collect::<Result<Vec<_>, _>>()
			.context("geolocation option contains a NUL byte")?;
		let mut list: Vec<*mut c_char> = strings.iter().map(|s| s.as_ptr().cast_mut()).collect();
		list.push(ptr::null_mut());

		let handle = unsafe { gdal_sys::GDALCreateGeoLocTransformer(ptr::null_mut(), list.as_mut_ptr() as _, 0) };
		ensure!(!handle.is_null(), "GDAL failed to create a geolocation transformer from {options:?}");
		Ok(Arc::new(GeoLocTransform {
			handle: Mutex::new(handle),
		}))
	}
}

struct CrsTransform {
	forward: Mutex<CoordTransform>,
	inverse: Mutex<CoordTransform>,
}

unsafe impl Send for CrsTransform {}
unsafe impl Sync for CrsTransform {}

impl PointTransform for CrsTransform {
	fn transform(
		&self,
		direction: Direction,
		xs: &mut [f64],
		ys: &mut [f64],
		zs: &mut [f64],
		success: &mut [bool],
	) -> Result<()> {
		let count = c_int::try_from(xs.len())?;
		let mut flags = vec![0 as c_int; xs.len()];
		let transform = match direction {
			Direction::SourceToDestination => self.forward.lock(),
			Direction::DestinationToSource => self.inverse.lock(),
		};
		unsafe {
			gdal_sys::OCTTransformEx(
				transform.to_c_hct(),
				count,
				xs.as_mut_ptr(),
				ys.as_mut_ptr(),
				zs.as_mut_ptr(),
				flags.as_mut_ptr(),
			);
		}
		for (s, flag) in success.iter_mut().zip(flags) {
			*s = flag != 0;
		}
		Ok(())
	}
}

struct GeoLocTransform {
	handle: Mutex<*mut c_void>,
}

unsafe impl Send for GeoLocTransform {}
unsafe impl Sync for GeoLocTransform {}

impl PointTransform for GeoLocTransform {
	fn transform(
		&self,
		direction: Direction,
		xs: &mut [f64],
		ys: &mut [f64],
		zs: &mut [f64],
		success: &mut [bool],
	) -> Result<()> {
		let count = c_int::try_from(xs.len())?;
		let dst_to_src = c_int::from(direction == Direction::DestinationToSource);
		let mut flags = vec![0 as c_int; xs.len()];
		let handle = self.handle.lock();
		unsafe {
			gdal_sys::GDALGeoLocTransform(
				*handle,
				dst_to_src,
				count,
				xs.as_mut_ptr(),
				ys.as_mut_ptr(),
				zs.as_mut_ptr(),
				flags.as_mut_ptr(),
			);
		}
		for (s, flag) in success.iter_mut().zip(flags) {
			*s = flag != 0;
		}
		Ok(())
	}
}

impl Drop for GeoLocTransform {
	fn drop(&mut self) {
		unsafe { gdal_sys::GDALDestroyGeoLocTransformer(*self.handle.get_mut()) };
	}
}
