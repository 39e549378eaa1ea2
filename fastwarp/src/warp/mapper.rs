use crate::{engine::Direction, transform::ApproxTransformer};
use anyhow::{Result, ensure};
use fastwarp_core::{BlockGrid, BlockIndex, DestinationWindow};
use std::collections::BTreeMap;

const TRUNCATION_EPSILON: f64 = 1e-10;

/// Pixels served by one source block, as parallel sequences of linear source
/// pixel index and linear destination (window) index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockPixels {
	pub source: Vec<usize>,
	pub destination: Vec<usize>,
}

impl BlockPixels {
	pub fn len(&self) -> usize {
		self.source.len()
	}

	pub fn is_empty(&self) -> bool {
		self.source.is_empty()
	}

	fn push(&mut self, source: usize, destination: usize) {
		self.source.push(source);
		self.destination.push(destination);
	}
}

/// Destination pixels grouped by the source block they read from.
#[derive(Clone, Debug, Default)]
pub struct PixelMapping {
	pub groups: BTreeMap<BlockIndex, BlockPixels>,
	pub mapped: usize,
	pub dropped: usize,
}

impl PixelMapping {
	pub fn block_count(&self) -> usize {
		self.groups.len()
	}
}

/// Maps every pixel center of `window` back to a source pixel of `grid`.
///
/// Each window row goes through `transformer` in one batch. Points that fail
/// to transform, land at negative coordinates or fall outside the source
/// raster are dropped.
pub fn map_pixels(transformer: &ApproxTransformer, window: &DestinationWindow, grid: &BlockGrid) -> Result<PixelMapping> {
	ensure!(!window.is_empty(), "destination window {window:?} is empty");

	let width = window.width;
	let mut mapping = PixelMapping::default();
	let mut xs = vec![0.0; width];
	let mut ys = vec![0.0; width];
	let mut zs = vec![0.0; width];
	let mut success = vec![false; width];

	for row in 0..window.height {
		for (col, (x, y)) in xs.iter_mut().zip(ys.iter_mut()).enumerate() {
			(*x, *y) = window.pixel_center(col, row);
		}
		zs.fill(0.0);
		success.fill(false);

		if let Err(err) = transformer.transform(Direction::DestinationToSource, &mut xs, &mut ys, &mut zs, &mut success) {
			log::debug!("row {row} failed to transform: {err:#}");
			mapping.dropped += width;
			continue;
		}

		for col in 0..width {
			let Some((sx, sy)) = source_pixel(xs[col], ys[col], success[col], grid) else {
				mapping.dropped += 1;
				continue;
			};
			let (block, _) = grid.locate(sx, sy);
			mapping
				.groups
				.entry(block)
				.or_default()
				.push(sy * grid.raster_width + sx, row * width + col);
			mapping.mapped += 1;
		}
	}

	log::trace!(
		"mapped {} pixels onto {} blocks, dropped {}",
		mapping.mapped,
		mapping.groups.len(),
		mapping.dropped
	);
	Ok(mapping)
}

fn source_pixel(x: f64, y: f64, success: bool, grid: &BlockGrid) -> Option<(usize, usize)> {
	if !success || !(x >= 0.0 && y >= 0.0) {
		return None;
	}
	let sx = (x + TRUNCATION_EPSILON) as usize;
	let sy = (y + TRUNCATION_EPSILON) as usize;
	(sx < grid.raster_width && sy < grid.raster_height).then_some((sx, sy))
}
