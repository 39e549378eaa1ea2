use crate::transform::SuggestedOutput;
use fastwarp_core::DestinationWindow;

const ROUNDING_EPSILON: f64 = 1e-10;

/// Rounds a destination pixel coordinate onto a grid of `extent` pixels.
///
/// Negative coordinates clamp to 0; everything else truncates with a small
/// bias and clamps to the last pixel.
pub fn round_coord(coord: f64, extent: usize) -> usize {
	if coord < 0.0 || coord.is_nan() {
		return 0;
	}
	let last = extent.saturating_sub(1);
	let truncated = (coord + ROUNDING_EPSILON) as usize;
	truncated.min(last)
}

/// Shrinks the nominal `width`x`height` output grid to the area the source
/// actually covers.
///
/// Without a suggested output the full grid is returned.
pub fn clip_window(suggested: Option<&SuggestedOutput>, width: usize, height: usize) -> DestinationWindow {
	let Some(suggested) = suggested else {
		return DestinationWindow::full(width, height);
	};

	let [min_x, min_y, max_x, max_y] = suggested.extent;
	let x0 = round_coord(min_x, width);
	let y0 = round_coord(min_y, height);
	let x1 = round_coord(max_x + 0.5, width).max(x0);
	let y1 = round_coord(max_y + 0.5, height).max(y0);

	let window = DestinationWindow::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1);
	log::trace!("clipped {width}x{height} to {window:?}");
	window
}

#[cfg(test)]
mod tests {
	use super::*;
	use fastwarp_core::GeoTransform;
	use rstest::rstest;

	fn suggested(extent: [f64; 4]) -> SuggestedOutput {
		SuggestedOutput {
			geo_transform: GeoTransform::IDENTITY,
			pixels: 0,
			lines: 0,
			extent,
		}
	}

	#[rstest]
	#[case(-0.3, 100, 0)]
	#[case(-1e6, 100, 0)]
	#[case(0.0, 100, 0)]
	#[case(99.6, 100, 99)]
	#[case(9.6 + 0.5, 11, 10)]
	#[case(3.0 - 1e-12, 100, 3)]
	#[case(1e9, 100, 99)]
	#[case(5.0, 0, 0)]
	fn rounds_and_clamps(#[case] coord: f64, #[case] extent: usize, #[case] expected: usize) {
		assert_eq!(round_coord(coord, extent), expected);
	}

	#[test]
	fn no_suggestion_keeps_full_grid() {
		assert_eq!(clip_window(None, 256, 128), DestinationWindow::full(256, 128));
	}

	#[test]
	fn clips_to_covered_area() {
		let window = clip_window(Some(&suggested([10.2, 20.7, 49.6, 60.1])), 100, 100);
		assert_eq!(window, DestinationWindow::new(10, 20, 41, 41));
	}

	#[test]
	fn coverage_beyond_grid_is_clamped() {
		let window = clip_window(Some(&suggested([-50.0, -50.0, 500.0, 500.0])), 64, 32);
		assert_eq!(window, DestinationWindow::full(64, 32));
	}

	#[test]
	fn inverted_extent_collapses_to_one_pixel() {
		let window = clip_window(Some(&suggested([30.0, 30.0, 10.0, 10.0])), 100, 100);
		assert_eq!(window, DestinationWindow::new(30, 30, 1, 1));
	}
}
