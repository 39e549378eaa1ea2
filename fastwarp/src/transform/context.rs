use crate::engine::{Direction, PointTransform};
use anyhow::{Context, Result, bail, ensure};
use fastwarp_core::GeoTransform;
use std::sync::Arc;

/// How source pixels are georeferenced.
#[derive(Clone, Debug)]
pub enum SourceGeoreference {
	Affine {
		geo_transform: GeoTransform,
		inverse: GeoTransform,
	},
	/// Per-pixel geolocation arrays, mapping source pixel/line to geographic
	/// coordinates and back.
	GeoLocation(Arc<dyn PointTransform>),
}

/// Reprojection state mapping between source and destination pixel space.
///
/// The chain is `source pixel <-> source CRS <-> destination CRS <->
/// destination pixel`. The CRS step is optional and shared between clones, so a
/// per-request copy of a cached context costs two geotransforms.
#[derive(Clone, Debug)]
pub struct TransformContext {
	source: SourceGeoreference,
	reprojection: Option<Arc<dyn PointTransform>>,
	dst_geo_transform: GeoTransform,
	dst_inverse: GeoTransform,
}

impl TransformContext {
	pub fn new_affine(
		src_gt: &GeoTransform,
		reprojection: Option<Arc<dyn PointTransform>>,
		dst_gt: &GeoTransform,
	) -> Result<TransformContext> {
		let inverse = src_gt.try_invert().context("inverting source geotransform")?;
		let dst_inverse = dst_gt.try_invert().context("inverting destination geotransform")?;
		Ok(TransformContext {
			source: SourceGeoreference::Affine {
				geo_transform: *src_gt,
				inverse,
			},
			reprojection,
			dst_geo_transform: *dst_gt,
			dst_inverse,
		})
	}

	pub fn new_geolocated(
		geolocation: Arc<dyn PointTransform>,
		reprojection: Option<Arc<dyn PointTransform>>,
		dst_gt: &GeoTransform,
	) -> Result<TransformContext> {
		let dst_inverse = dst_gt.try_invert().context("inverting destination geotransform")?;
		Ok(TransformContext {
			source: SourceGeoreference::GeoLocation(geolocation),
			reprojection,
			dst_geo_transform: *dst_gt,
			dst_inverse,
		})
	}

	pub fn source(&self) -> &SourceGeoreference {
		&self.source
	}

	/// The source geotransform, or `None` for geolocated sources.
	pub fn source_geo_transform(&self) -> Option<GeoTransform> {
		match &self.source {
			SourceGeoreference::Affine { geo_transform, .. } => Some(*geo_transform),
			SourceGeoreference::GeoLocation(_) => None,
		}
	}

	pub fn destination_geo_transform(&self) -> GeoTransform {
		self.dst_geo_transform
	}

	pub fn is_geolocated(&self) -> bool {
		matches!(self.source, SourceGeoreference::GeoLocation(_))
	}

	/// `true` if the context carries a CRS-to-CRS step.
	pub fn has_reprojection(&self) -> bool {
		self.reprojection.is_some()
	}

	/// Replaces the source geotransform and recomputes its inverse.
	pub fn set_source_geo_transform(&mut self, gt: &GeoTransform) -> Result<()> {
		if self.is_geolocated() {
			bail!("a geolocated source has no geotransform");
		}
		let inverse = gt.try_invert().context("inverting source geotransform")?;
		self.source = SourceGeoreference::Affine {
			geo_transform: *gt,
			inverse,
		};
		Ok(())
	}

	/// Replaces the destination geotransform and recomputes its inverse.
	pub fn set_destination_geo_transform(&mut self, gt: &GeoTransform) -> Result<()> {
		self.dst_inverse = gt.try_invert().context("inverting destination geotransform")?;
		self.dst_geo_transform = *gt;
		Ok(())
	}

	/// A copy of this context bound to the given geotransforms.
	pub fn rebind(&self, src_gt: &GeoTransform, dst_gt: &GeoTransform) -> Result<TransformContext> {
		let mut context = self.clone();
		context.set_source_geo_transform(src_gt)?;
		context.set_destination_geo_transform(dst_gt)?;
		Ok(context)
	}

	/// Transforms points in place between source and destination pixel space.
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
		success.fill(true);

		match direction {
			Direction::DestinationToSource => {
				apply_affine(&self.dst_geo_transform, xs, ys);
				if let Some(reprojection) = &self.reprojection {
					apply_step(reprojection.as_ref(), direction, xs, ys, zs, success)?;
				}
				match &self.source {
					SourceGeoreference::Affine { inverse, .. } => apply_affine(inverse, xs, ys),
					SourceGeoreference::GeoLocation(geolocation) => {
						apply_step(geolocation.as_ref(), direction, xs, ys, zs, success)?;
					}
				}
			}
			Direction::SourceToDestination => {
				match &self.source {
					SourceGeoreference::Affine { geo_transform, .. } => apply_affine(geo_transform, xs, ys),
					SourceGeoreference::GeoLocation(geolocation) => {
						apply_step(geolocation.as_ref(), direction, xs, ys, zs, success)?;
					}
				}
				if let Some(reprojection) = &self.reprojection {
					apply_step(reprojection.as_ref(), direction, xs, ys, zs, success)?;
				}
				apply_affine(&self.dst_inverse, xs, ys);
			}
		}

		for (s, (x, y)) in success.iter_mut().zip(xs.iter().zip(ys.iter())) {
			*s = *s && x.is_finite() && y.is_finite();
		}
		Ok(())
	}
}

fn apply_affine(gt: &GeoTransform, xs: &mut [f64], ys: &mut [f64]) {
	for (x, y) in xs.iter_mut().zip(ys.iter_mut()) {
		(*x, *y) = gt.apply(*x, *y);
	}
}

fn apply_step(
	step: &dyn PointTransform,
	direction: Direction,
	xs: &mut [f64],
	ys: &mut [f64],
	zs: &mut [f64],
	success: &mut [bool],
) -> Result<()> {
	let mut ok = vec![true; xs.len()];
	step.transform(direction, xs, ys, zs, &mut ok)?;
	for (s, o) in success.iter_mut().zip(ok) {
		*s = *s && o;
	}
	Ok(())
}
