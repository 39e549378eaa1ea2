use anyhow::{Result, ensure};
use std::fmt::Debug;

/// Identifies one source block as `x_block + y_block * blocks_per_row`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockIndex(pub usize);

/// The native block tiling of a raster band.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BlockGrid {
	pub raster_width: usize,
	pub raster_height: usize,
	pub block_width: usize,
	pub block_height: usize,
	pub blocks_per_row: usize,
	pub blocks_per_column: usize,
}

impl BlockGrid {
	pub fn new(raster_size: (usize, usize), block_size: (usize, usize)) -> Result<BlockGrid> {
		let (raster_width, raster_height) = raster_size;
		let (block_width, block_height) = block_size;
		ensure!(
			block_width > 0 && block_height > 0,
			"block size must be positive, got {block_width}x{block_height}"
		);
		Ok(BlockGrid {
			raster_width,
			raster_height,
			block_width,
			block_height,
			blocks_per_row: raster_width.div_ceil(block_width),
			blocks_per_column: raster_height.div_ceil(block_height),
		})
	}

	pub fn block_count(&self) -> usize {
		self.blocks_per_row * self.blocks_per_column
	}

	/// Number of samples in one (full) block.
	pub fn block_pixel_count(&self) -> usize {
		self.block_width * self.block_height
	}

	pub fn block_byte_size(&self, sample_size: usize) -> usize {
		self.block_pixel_count() * sample_size
	}

	pub fn index(&self, x_block: usize, y_block: usize) -> BlockIndex {
		BlockIndex(x_block + y_block * self.blocks_per_row)
	}

	pub fn coords(&self, index: BlockIndex) -> (usize, usize) {
		(index.0 % self.blocks_per_row, index.0 / self.blocks_per_row)
	}

	/// Returns the owning block of source pixel `(x, y)` and the sample offset
	/// inside that block.
	#[inline]
	pub fn locate(&self, x: usize, y: usize) -> (BlockIndex, usize) {
		let index = self.index(x / self.block_width, y / self.block_height);
		let offset = (x % self.block_width) + (y % self.block_height) * self.block_width;
		(index, offset)
	}
}

impl Debug for BlockGrid {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"BlockGrid(raster {}x{}, block {}x{}, {}x{} blocks)",
			self.raster_width,
			self.raster_height,
			self.block_width,
			self.block_height,
			self.blocks_per_row,
			self.blocks_per_column
		)
	}
}
