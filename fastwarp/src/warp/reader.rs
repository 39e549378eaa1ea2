use super::mapper::{BlockPixels, PixelMapping};
use crate::engine::RasterBand;
use anyhow::{Result, ensure};
use fastwarp_core::{BlockGrid, BlockIndex, BufferPool, DataType, PooledBuffer, convert::copy_with_conversion};
use parking_lot::Mutex;
use rayon::{ThreadPool, prelude::*};

/// Outcome of reading the blocks of a [`PixelMapping`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
	pub blocks_read: usize,
	pub blocks_failed: usize,
}

impl ReadStats {
	fn merge(self, other: ReadStats) -> ReadStats {
		ReadStats {
			blocks_read: self.blocks_read + other.blocks_read,
			blocks_failed: self.blocks_failed + other.blocks_failed,
		}
	}
}

/// Reads every block referenced by `mapping` once and scatters its samples
/// into `destination`, encoded as `output_type`.
///
/// A block that fails to read is logged and skipped, so its destination
/// pixels keep their previous value. With `threads`, blocks are read in
/// parallel and the scatter is serialized.
pub fn read_and_scatter(
	band: &dyn RasterBand,
	grid: &BlockGrid,
	mapping: &PixelMapping,
	output_type: DataType,
	destination: &mut [u8],
	pool: &BufferPool,
	threads: Option<&ThreadPool>,
) -> Result<ReadStats> {
	let source_type = band.data_type();
	ensure!(source_type.size() > 0, "band has unknown data type");
	ensure!(output_type.size() > 0, "output has unknown data type");

	let last_destination = mapping
		.groups
		.values()
		.filter_map(|pixels| pixels.destination.iter().max())
		.max();
	if let Some(last) = last_destination {
		ensure!(
			(last + 1) * output_type.size() <= destination.len(),
			"destination buffer of {} bytes is too small for pixel {last}",
			destination.len()
		);
	}

	let block_bytes = grid.block_byte_size(source_type.size());
	let transfer = Transfer {
		grid,
		source_type,
		output_type,
	};

	let threads = threads.filter(|_| mapping.groups.len() > 1);
	let Some(threads) = threads else {
		let mut stats = ReadStats::default();
		for (index, pixels) in &mapping.groups {
			match read_block(band, grid, *index, block_bytes, pool) {
				Some(block) => {
					transfer.scatter(&block, pixels, destination)?;
					stats.blocks_read += 1;
				}
				None => stats.blocks_failed += 1,
			}
		}
		return Ok(stats);
	};

	let destination = Mutex::new(destination);
	threads.install(|| {
		mapping
			.groups
			.par_iter()
			.map(|(index, pixels)| -> Result<ReadStats> {
				let Some(block) = read_block(band, grid, *index, block_bytes, pool) else {
					return Ok(ReadStats {
						blocks_read: 0,
						blocks_failed: 1,
					});
				};
				let mut destination = destination.lock();
				transfer.scatter(&block, pixels, &mut destination)?;
				Ok(ReadStats {
					blocks_read: 1,
					blocks_failed: 0,
				})
			})
			.try_reduce(ReadStats::default, |a, b| Ok(a.merge(b)))
	})
}

fn read_block(
	band: &dyn RasterBand,
	grid: &BlockGrid,
	index: BlockIndex,
	block_bytes: usize,
	pool: &BufferPool,
) -> Option<PooledBuffer> {
	let (x_block, y_block) = grid.coords(index);
	let mut buffer = pool.acquire(block_bytes);
	match band.read_block(x_block, y_block, &mut buffer) {
		Ok(()) => Some(buffer),
		Err(err) => {
			log::warn!("skipping block ({x_block}, {y_block}): {err:#}");
			None
		}
	}
}

struct Transfer<'a> {
	grid: &'a BlockGrid,
	source_type: DataType,
	output_type: DataType,
}

impl Transfer<'_> {
	fn scatter(&self, block: &[u8], pixels: &BlockPixels, destination: &mut [u8]) -> Result<()> {
		let source_size = self.source_type.size();
		let output_size = self.output_type.size();
		let raw = self.source_type == self.output_type && self.source_type.is_fast_path();
		let raster_width = self.grid.raster_width;

		for (source, target) in pixels.source.iter().zip(pixels.destination.iter()) {
			let (_, offset) = self.grid.locate(source % raster_width, source / raster_width);
			let from = &block[offset * source_size..(offset + 1) * source_size];
			let to = &mut destination[target * output_size..(target + 1) * output_size];
			if raw {
				to.copy_from_slice(from);
			} else {
				copy_with_conversion(from, self.source_type, to, self.output_type, 1)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		engine::memory::MemoryBand,
		transform::{ApproxTransformer, TransformContext},
		warp::mapper::map_pixels,
	};
	use fastwarp_core::{DestinationWindow, GeoTransform, convert::read_sample};
	use pretty_assertions::assert_eq;
	use rayon::ThreadPoolBuilder;

	fn identity_mapping(grid: &BlockGrid, window: DestinationWindow) -> PixelMapping {
		let context = TransformContext::new_affine(&GeoTransform::IDENTITY, None, &GeoTransform::IDENTITY).unwrap();
		map_pixels(&ApproxTransformer::new(&context, 0.125), &window, grid).unwrap()
	}

	fn ramp(width: usize, height: usize, data_type: DataType) -> MemoryBand {
		MemoryBand::from_fn(width, height, data_type, |x, y| (x + y * width) as f64).with_block_size(4, 4)
	}

	fn values(buffer: &[u8], data_type: DataType) -> Vec<f64> {
		(0..buffer.len() / data_type.size())
			.map(|i| read_sample(buffer, data_type, i))
			.collect()
	}

	#[test]
	fn copies_matching_types() {
		let band = ramp(10, 6, DataType::Int16);
		let grid = BlockGrid::new((10, 6), (4, 4)).unwrap();
		let mapping = identity_mapping(&grid, DestinationWindow::full(10, 6));
		let mut out = vec![0u8; 60 * 2];
		let stats = read_and_scatter(&band, &grid, &mapping, DataType::Int16, &mut out, &BufferPool::default(), None).unwrap();
		assert_eq!(stats, ReadStats {
			blocks_read: 6,
			blocks_failed: 0
		});
		assert_eq!(values(&out, DataType::Int16), (0..60).map(|v| v as f64).collect::<Vec<_>>());
		assert_eq!(band.block_reads(), 6);
	}

	#[test]
	fn converts_to_float32() {
		let band = ramp(4, 4, DataType::Float64);
		let grid = BlockGrid::new((4, 4), (4, 4)).unwrap();
		let mapping = identity_mapping(&grid, DestinationWindow::full(4, 4));
		let mut out = vec![0u8; 16 * 4];
		read_and_scatter(&band, &grid, &mapping, DataType::Float32, &mut out, &BufferPool::default(), None).unwrap();
		assert_eq!(values(&out, DataType::Float32)[15], 15.0);
	}

	#[test]
	fn failed_blocks_are_skipped() {
		let band = ramp(8, 4, DataType::Byte).with_failing_block(1, 0);
		let grid = BlockGrid::new((8, 4), (4, 4)).unwrap();
		let mapping = identity_mapping(&grid, DestinationWindow::full(8, 4));
		let mut out = vec![255u8; 32];
		let stats = read_and_scatter(&band, &grid, &mapping, DataType::Byte, &mut out, &BufferPool::default(), None).unwrap();
		assert_eq!(stats.blocks_read, 1);
		assert_eq!(stats.blocks_failed, 1);
		assert_eq!(out[0..4], [0, 1, 2, 3]);
		assert_eq!(out[4..8], [255; 4]);
	}

	#[test]
	fn parallel_matches_sequential() {
		let band = ramp(37, 23, DataType::UInt16);
		let grid = BlockGrid::new((37, 23), (4, 4)).unwrap();
		let mapping = identity_mapping(&grid, DestinationWindow::full(37, 23));
		let pool = BufferPool::default();

		let mut sequential = vec![0u8; 37 * 23 * 2];
		read_and_scatter(&band, &grid, &mapping, DataType::UInt16, &mut sequential, &pool, None).unwrap();

		let threads = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
		let mut parallel = vec![0u8; 37 * 23 * 2];
		let stats = read_and_scatter(&band, &grid, &mapping, DataType::UInt16, &mut parallel, &pool, Some(&threads)).unwrap();

		assert_eq!(stats.blocks_read, grid.block_count());
		assert_eq!(sequential, parallel);
	}

	#[test]
	fn short_destination_is_rejected() {
		let band = ramp(4, 4, DataType::Byte);
		let grid = BlockGrid::new((4, 4), (4, 4)).unwrap();
		let mapping = identity_mapping(&grid, DestinationWindow::full(4, 4));
		let mut out = vec![0u8; 8];
		assert!(read_and_scatter(&band, &grid, &mapping, DataType::Byte, &mut out, &BufferPool::default(), None).is_err());
	}
}
