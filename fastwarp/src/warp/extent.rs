use crate::transform::SuggestedOutput;
use anyhow::{Result, ensure};

/// Size of a bounding box in the native resolution of a source, expressed in
/// a destination CRS.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReprojectExtent {
	pub pixels: usize,
	pub lines: usize,
	pub x_resolution: f64,
	pub y_resolution: f64,
}

/// Measures `bbox` (`[min_x, min_y, max_x, max_y]` in destination CRS units)
/// with the resolution of `suggested`.
pub fn measure_extent(suggested: &SuggestedOutput, bbox: &[f64; 4]) -> Result<ReprojectExtent> {
	let gt = suggested.geo_transform.coefficients();
	let x_resolution = gt[1];
	let y_resolution = gt[5].abs();
	ensure!(
		x_resolution > 0.0 && y_resolution > 0.0,
		"suggested output has no resolution: {:?}",
		suggested.geo_transform
	);

	let [min_x, min_y, max_x, max_y] = *bbox;
	ensure!(
		min_x <= max_x && min_y <= max_y,
		"bounding box {bbox:?} is not ordered as [min_x, min_y, max_x, max_y]"
	);

	Ok(ReprojectExtent {
		pixels: ((max_x - min_x + x_resolution / 2.0) / x_resolution) as usize,
		lines: ((max_y - min_y + y_resolution / 2.0) / y_resolution) as usize,
		x_resolution,
		y_resolution,
	})
}
