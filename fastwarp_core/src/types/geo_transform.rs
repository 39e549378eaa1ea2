use anyhow::{Result, anyhow};
use std::fmt::Debug;

/// An affine mapping between pixel/line space and georeferenced coordinates.
///
/// The six coefficients follow the usual raster convention:
/// `[origin_x, pixel_width, rotation_x, origin_y, rotation_y, pixel_height]`, so
///
/// ```text
/// x_geo = gt[0] + pixel * gt[1] + line * gt[2]
/// y_geo = gt[3] + pixel * gt[4] + line * gt[5]
/// ```
///
/// # Examples
/// ```
/// use fastwarp_core::GeoTransform;
///
/// let gt = GeoTransform::new([100.0, 2.0, 0.0, 50.0, 0.0, -2.0]);
/// assert_eq!(gt.apply(3.0, 4.0), (106.0, 42.0));
///
/// let inv = gt.invert().unwrap();
/// assert_eq!(inv.apply(106.0, 42.0), (3.0, 4.0));
/// ```
#[derive(Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
	pub const IDENTITY: GeoTransform = GeoTransform([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

	pub fn new(coefficients: [f64; 6]) -> Self {
		GeoTransform(coefficients)
	}

	pub fn coefficients(&self) -> &[f64; 6] {
		&self.0
	}

	/// Maps a pixel/line position to georeferenced coordinates.
	#[inline]
	pub fn apply(&self, pixel: f64, line: f64) -> (f64, f64) {
		let gt = &self.0;
		(
			gt[0] + pixel * gt[1] + line * gt[2],
			gt[3] + pixel * gt[4] + line * gt[5],
		)
	}

	/// `true` when the transform has no rotation/shear terms.
	pub fn is_north_up(&self) -> bool {
		self.0[2] == 0.0 && self.0[4] == 0.0
	}

	/// Computes the inverse transform.
	///
	/// Returns `None` when the matrix is singular, e.g. a zero pixel size.
	pub fn invert(&self) -> Option<GeoTransform> {
		let gt = &self.0;

		// Fast path for north-up images, which is also exact.
		if self.is_north_up() {
			if gt[1] == 0.0 || gt[5] == 0.0 {
				return None;
			}
			return Some(GeoTransform([
				-gt[0] / gt[1],
				1.0 / gt[1],
				0.0,
				-gt[3] / gt[5],
				0.0,
				1.0 / gt[5],
			]));
		}

		let det = gt[1] * gt[5] - gt[2] * gt[4];
		let magnitude = gt[1].abs().max(gt[2].abs()).max(gt[4].abs()).max(gt[5].abs());
		if det.abs() <= 1e-10 * magnitude * magnitude || !det.is_finite() {
			return None;
		}

		let inv_det = 1.0 / det;
		Some(GeoTransform([
			(gt[2] * gt[3] - gt[0] * gt[5]) * inv_det,
			gt[5] * inv_det,
			-gt[2] * inv_det,
			(-gt[1] * gt[3] + gt[0] * gt[4]) * inv_det,
			-gt[4] * inv_det,
			gt[1] * inv_det,
		]))
	}

	/// Like [`GeoTransform::invert`], but as an error for callers that treat a
	/// singular matrix as fatal.
	pub fn try_invert(&self) -> Result<GeoTransform> {
		self
			.invert()
			.ok_or_else(|| anyhow!("geotransform {self:?} is not invertible"))
	}

	/// Rescales the pixel-axis terms by `x_factor` and the line-axis terms by
	/// `y_factor`.
	///
	/// Used when switching to a pyramid level whose pixels cover
	/// `x_factor × y_factor` full-resolution pixels.
	pub fn scaled(&self, x_factor: f64, y_factor: f64) -> GeoTransform {
		let mut gt = self.0;
		gt[1] *= x_factor;
		gt[4] *= x_factor;
		gt[2] *= y_factor;
		gt[5] *= y_factor;
		GeoTransform(gt)
	}
}

impl Default for GeoTransform {
	fn default() -> Self {
		GeoTransform::IDENTITY
	}
}

impl From<[f64; 6]> for GeoTransform {
	fn from(value: [f64; 6]) -> Self {
		GeoTransform(value)
	}
}

impl Debug for GeoTransform {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "GeoTransform{:?}", self.0)
	}
}
