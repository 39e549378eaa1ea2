use super::TransformContext;
use crate::engine::Direction;
use anyhow::{Result, ensure};

/// Approximates a transform along scanlines by linear interpolation.
///
/// A row is transformed exactly at its first, middle and last point. If the
/// interpolated middle point is within `tolerance` of the exact one on both
/// axes, the whole row is interpolated; otherwise both halves are handled the
/// same way.
pub struct ApproxTransformer<'a> {
	context: &'a TransformContext,
	tolerance: f64,
}

/// Rows this short are always transformed exactly.
const MIN_APPROX_POINTS: usize = 5;

impl<'a> ApproxTransformer<'a> {
	pub fn new(context: &'a TransformContext, tolerance: f64) -> Self {
		ApproxTransformer { context, tolerance }
	}

	pub fn tolerance(&self) -> f64 {
		self.tolerance
	}

	pub fn transform(
		&self,
		direction: Direction,
		xs: &mut [f64],
		ys: &mut [f64],
		zs: &mut [f64],
		success: &mut [bool],
	) -> Result<()> {
		let n = xs.len();
		ensure!(
			ys.len() == n && zs.len() == n && success.len() == n,
			"point buffers differ in length"
		);
		if n == 0 {
			return Ok(());
		}

		let y0 = ys[0];
		let z0 = zs[0];
		if n <= MIN_APPROX_POINTS || ys.iter().any(|y| *y != y0) || zs.iter().any(|z| *z != z0) {
			return self.context.transform(direction, xs, ys, zs, success);
		}
		self.approximate(direction, xs, ys, zs, success)
	}

	fn approximate(
		&self,
		direction: Direction,
		xs: &mut [f64],
		ys: &mut [f64],
		zs: &mut [f64],
		success: &mut [bool],
	) -> Result<()> {
		let n = xs.len();
		let x0 = xs[0];
		let span = xs[n - 1] - x0;
		if n <= MIN_APPROX_POINTS || span == 0.0 {
			return self.context.transform(direction, xs, ys, zs, success);
		}

		let mid = (n - 1) / 2;
		let mut px = [x0, xs[mid], xs[n - 1]];
		let mut py = [ys[0]; 3];
		let mut pz = [zs[0]; 3];
		let mut ok = [false; 3];
		self.context.transform(direction, &mut px, &mut py, &mut pz, &mut ok)?;
		if !ok.iter().all(|v| *v) {
			return self.context.transform(direction, xs, ys, zs, success);
		}

		let dx = (px[2] - px[0]) / span;
		let dy = (py[2] - py[0]) / span;
		let dz = (pz[2] - pz[0]) / span;
		let t = xs[mid] - x0;
		let error_x = (px[0] + dx * t - px[1]).abs();
		let error_y = (py[0] + dy * t - py[1]).abs();

		if error_x > self.tolerance || error_y > self.tolerance {
			let (xs_a, xs_b) = xs.split_at_mut(mid);
			let (ys_a, ys_b) = ys.split_at_mut(mid);
			let (zs_a, zs_b) = zs.split_at_mut(mid);
			let (success_a, success_b) = success.split_at_mut(mid);
			self.approximate(direction, xs_a, ys_a, zs_a, success_a)?;
			return self.approximate(direction, xs_b, ys_b, zs_b, success_b);
		}

		for i in 0..n {
			let t = xs[i] - x0;
			xs[i] = px[0] + dx * t;
			ys[i] = py[0] + dy * t;
			zs[i] = pz[0] + dz * t;
			success[i] = true;
		}
		Ok(())
	}
}
