use super::TransformContext;
use crate::engine::Direction;
use anyhow::{Result, bail, ensure};
use fastwarp_core::GeoTransform;

/// Points sampled along each edge of the source raster.
const EDGE_SAMPLES: usize = 21;

/// Destination grid that covers a whole source raster at roughly its native
/// resolution, in the context's destination pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SuggestedOutput {
	pub geo_transform: GeoTransform,
	pub pixels: usize,
	pub lines: usize,
	/// `[min_x, min_y, max_x, max_y]` of the transformed samples.
	pub extent: [f64; 4],
}

impl SuggestedOutput {
	/// Size of one suggested output pixel relative to one destination pixel.
	pub fn pixel_size(&self) -> f64 {
		self.geo_transform.0[1]
	}
}

fn edge_points(width: f64, height: f64) -> (Vec<f64>, Vec<f64>) {
	let mut xs = Vec::with_capacity(EDGE_SAMPLES * 4);
	let mut ys = Vec::with_capacity(EDGE_SAMPLES * 4);
	let step = 1.0 / (EDGE_SAMPLES - 1) as f64;
	for i in 0..EDGE_SAMPLES {
		let t = i as f64 * step;
		for (x, y) in [(t * width, 0.0), (t * width, height), (0.0, t * height), (width, t * height)] {
			xs.push(x);
			ys.push(y);
		}
	}
	(xs, ys)
}

fn grid_points(width: f64, height: f64) -> (Vec<f64>, Vec<f64>) {
	let mut xs = Vec::with_capacity(EDGE_SAMPLES * EDGE_SAMPLES);
	let mut ys = Vec::with_capacity(EDGE_SAMPLES * EDGE_SAMPLES);
	let step = 1.0 / (EDGE_SAMPLES - 1) as f64;
	for row in 0..EDGE_SAMPLES {
		for col in 0..EDGE_SAMPLES {
			xs.push(col as f64 * step * width);
			ys.push(row as f64 * step * height);
		}
	}
	(xs, ys)
}

/// Extent of the successfully transformed points, or `None` if none
/// succeeded, and whether every point succeeded.
fn transformed_extent(
	context: &TransformContext,
	mut xs: Vec<f64>,
	mut ys: Vec<f64>,
) -> Result<(Option<[f64; 4]>, bool)> {
	let mut zs = vec![0.0; xs.len()];
	let mut ok = vec![false; xs.len()];
	context.transform(Direction::SourceToDestination, &mut xs, &mut ys, &mut zs, &mut ok)?;

	let mut extent: Option<[f64; 4]> = None;
	for ((x, y), ok) in xs.iter().zip(ys.iter()).zip(ok.iter()) {
		if !*ok {
			continue;
		}
		extent = Some(match extent {
			None => [*x, *y, *x, *y],
			Some(e) => [e[0].min(*x), e[1].min(*y), e[2].max(*x), e[3].max(*y)],
		});
	}
	Ok((extent, ok.iter().all(|v| *v)))
}

/// Suggests the destination grid of a source raster of `raster_size` pixels.
///
/// The edge of the raster is sampled first; if any edge point fails to
/// transform, an interior grid is sampled as well. The output pixel size
/// keeps the diagonal's pixel count of the source.
pub fn suggest_output(raster_size: (usize, usize), context: &TransformContext) -> Result<SuggestedOutput> {
	let (width, height) = (raster_size.0 as f64, raster_size.1 as f64);
	ensure!(width > 0.0 && height > 0.0, "raster is empty");

	let (xs, ys) = edge_points(width, height);
	let (mut extent, all_edges_ok) = transformed_extent(context, xs, ys)?;
	if !all_edges_ok {
		log::trace!("edge samples failed to transform, sampling the interior");
		let (gx, gy) = grid_points(width, height);
		if let (Some(g), _) = transformed_extent(context, gx, gy)? {
			extent = Some(match extent {
				None => g,
				Some(e) => [e[0].min(g[0]), e[1].min(g[1]), e[2].max(g[2]), e[3].max(g[3])],
			});
		}
	}

	let Some(extent) = extent else {
		bail!("no sample point of the source raster could be transformed");
	};

	let [min_x, min_y, max_x, max_y] = extent;
	let diagonal = ((max_x - min_x).powi(2) + (max_y - min_y).powi(2)).sqrt();
	let source_diagonal = (width * width + height * height).sqrt();
	let resolution = diagonal / source_diagonal;
	ensure!(
		resolution > 0.0 && resolution.is_finite(),
		"degenerate output extent {extent:?}"
	);

	let pixels = ((max_x - min_x) / resolution + 0.5) as usize;
	let lines = ((max_y - min_y) / resolution + 0.5) as usize;
	let geo_transform = GeoTransform::new([min_x, resolution, 0.0, max_y, 0.0, -resolution]);
	log::trace!("suggested output {pixels}x{lines} at {resolution}, extent {extent:?}");

	Ok(SuggestedOutput {
		geo_transform,
		pixels,
		lines,
		extent,
	})
}
