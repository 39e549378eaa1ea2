use crate::transform::{SuggestedOutput, TransformContext};
use anyhow::{Context, Result};
use fastwarp_core::GeoTransform;

/// Resolution ratio to aim for when the suggested output downsamples the
/// source, i.e. when one destination pixel covers more than one source pixel.
pub fn downsampling_ratio(suggested: &SuggestedOutput) -> Option<f64> {
	let ratio = 1.0 / suggested.pixel_size();
	(ratio > 1.0 && ratio.is_finite()).then_some(ratio)
}

/// Picks the pyramid level whose resolution best matches `target_ratio`.
///
/// Levels are scanned from full resolution (ratio 1) through the overviews in
/// order. The scan stops at the first level within `tolerance` of the target,
/// or at the first level whose ratio lies below the target while the next
/// level's lies above it. Without a match the coarsest overview is used.
///
/// Returns the overview index, or `None` for full resolution.
pub fn select_overview_level(
	full_width: usize,
	overview_widths: &[usize],
	target_ratio: f64,
	tolerance: f64,
) -> Option<usize> {
	let ratio = |level: Option<usize>| match level {
		None => 1.0,
		Some(i) => full_width as f64 / overview_widths[i] as f64,
	};

	let count = overview_widths.len();
	if count == 0 {
		return None;
	}

	let mut level: Option<usize> = None;
	loop {
		let next = level.map_or(0, |i| i + 1);
		if next >= count {
			break;
		}
		let current_ratio = ratio(level);
		if current_ratio < target_ratio && ratio(Some(next)) > target_ratio {
			break;
		}
		if (current_ratio - target_ratio).abs() < tolerance {
			break;
		}
		level = Some(next);
	}
	level
}

/// Rescales the source geotransform to a pyramid level of `level_size` and
/// binds it to `context`.
pub fn apply_overview(
	context: &mut TransformContext,
	src_gt: &GeoTransform,
	full_size: (usize, usize),
	level_size: (usize, usize),
) -> Result<GeoTransform> {
	let x_factor = full_size.0 as f64 / level_size.0 as f64;
	let y_factor = full_size.1 as f64 / level_size.1 as f64;
	let scaled = src_gt.scaled(x_factor, y_factor);
	context
		.set_source_geo_transform(&scaled)
		.with_context(|| format!("binding overview geotransform {scaled:?}"))?;
	log::trace!("overview geotransform {scaled:?} (x{x_factor}, x{y_factor})");
	Ok(scaled)
}
