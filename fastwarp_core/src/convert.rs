//! Type-converting sample copies between raster data types.
//!
//! Samples are stored in native byte order. Conversions go through `f64`:
//! integer targets round to nearest and saturate at the type bounds, NaN
//! becomes `0`, complex sources contribute their real part and complex
//! targets receive a zero imaginary part.

use crate::DataType;
use anyhow::{Result, bail, ensure};
use byteorder::{ByteOrder, NativeEndian};
use num_traits::{Bounded, ToPrimitive};

/// Reads sample `index` of `buffer`, interpreted as `data_type`.
pub fn read_sample(buffer: &[u8], data_type: DataType, index: usize) -> f64 {
	let size = data_type.size();
	let b = &buffer[index * size..(index + 1) * size];
	match data_type {
		DataType::Unknown => 0.0,
		DataType::Byte => f64::from(b[0]),
		DataType::Int8 => f64::from(b[0] as i8),
		DataType::UInt16 => f64::from(NativeEndian::read_u16(b)),
		DataType::Int16 | DataType::CInt16 => f64::from(NativeEndian::read_i16(b)),
		DataType::UInt32 => f64::from(NativeEndian::read_u32(b)),
		DataType::Int32 | DataType::CInt32 => f64::from(NativeEndian::read_i32(b)),
		DataType::UInt64 => NativeEndian::read_u64(b) as f64,
		DataType::Int64 => NativeEndian::read_i64(b) as f64,
		DataType::Float32 | DataType::CFloat32 => f64::from(NativeEndian::read_f32(b)),
		DataType::Float64 | DataType::CFloat64 => NativeEndian::read_f64(b),
	}
}

/// Rounds and clamps `value` into the range of `T`.
fn saturate<T: Bounded + num_traits::NumCast + ToPrimitive>(value: f64) -> T {
	let zero = || num_traits::cast::<i32, T>(0).unwrap_or_else(T::min_value);
	if value.is_nan() {
		return zero();
	}
	let min = T::min_value().to_f64().unwrap_or(f64::MIN);
	let max = T::max_value().to_f64().unwrap_or(f64::MAX);
	let rounded = value.round();
	if rounded <= min {
		T::min_value()
	} else if rounded >= max {
		T::max_value()
	} else {
		num_traits::cast::<f64, T>(rounded).unwrap_or_else(zero)
	}
}

/// Writes `value` as sample `index` of `buffer`, interpreted as `data_type`.
pub fn write_sample(buffer: &mut [u8], data_type: DataType, index: usize, value: f64) {
	let size = data_type.size();
	let b = &mut buffer[index * size..(index + 1) * size];
	match data_type {
		DataType::Unknown => {}
		DataType::Byte => b[0] = saturate::<u8>(value),
		DataType::Int8 => b[0] = saturate::<i8>(value) as u8,
		DataType::UInt16 => NativeEndian::write_u16(b, saturate(value)),
		DataType::Int16 => NativeEndian::write_i16(b, saturate(value)),
		DataType::UInt32 => NativeEndian::write_u32(b, saturate(value)),
		DataType::Int32 => NativeEndian::write_i32(b, saturate(value)),
		DataType::UInt64 => NativeEndian::write_u64(b, saturate(value)),
		DataType::Int64 => NativeEndian::write_i64(b, saturate(value)),
		DataType::Float32 => NativeEndian::write_f32(b, value as f32),
		DataType::Float64 => NativeEndian::write_f64(b, value),
		DataType::CInt16 => {
			NativeEndian::write_i16(&mut b[..2], saturate(value));
			b[2..].fill(0);
		}
		DataType::CInt32 => {
			NativeEndian::write_i32(&mut b[..4], saturate(value));
			b[4..].fill(0);
		}
		DataType::CFloat32 => {
			NativeEndian::write_f32(&mut b[..4], value as f32);
			b[4..].fill(0);
		}
		DataType::CFloat64 => {
			NativeEndian::write_f64(&mut b[..8], value);
			b[8..].fill(0);
		}
	}
}

/// Copies `count` samples from `src` to `dst`, converting between the two
/// data types.
pub fn copy_with_conversion(
	src: &[u8],
	src_type: DataType,
	dst: &mut [u8],
	dst_type: DataType,
	count: usize,
) -> Result<()> {
	if src_type == DataType::Unknown || dst_type == DataType::Unknown {
		bail!("cannot convert samples of unknown data type");
	}
	ensure!(
		src.len() >= count * src_type.size(),
		"source buffer holds {} bytes, {count} {src_type} samples need {}",
		src.len(),
		count * src_type.size()
	);
	ensure!(
		dst.len() >= count * dst_type.size(),
		"destination buffer holds {} bytes, {count} {dst_type} samples need {}",
		dst.len(),
		count * dst_type.size()
	);

	if src_type == dst_type {
		let len = count * src_type.size();
		dst[..len].copy_from_slice(&src[..len]);
		return Ok(());
	}

	for i in 0..count {
		write_sample(dst, dst_type, i, read_sample(src, src_type, i));
	}
	Ok(())
}

/// Fills the whole buffer with `value` encoded as `data_type`.
pub fn fill_with_value(buffer: &mut [u8], data_type: DataType, value: f64) {
	let size = data_type.size();
	if size == 0 || buffer.len() < size {
		return;
	}
	write_sample(buffer, data_type, 0, value);
	let (first, rest) = buffer.split_at_mut(size);
	for chunk in rest.chunks_exact_mut(size) {
		chunk.copy_from_slice(first);
	}
}
