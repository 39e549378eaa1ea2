use anyhow::{Result, bail};
use std::fmt::Display;

/// Raster sample type, numbered the way raster libraries conventionally do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DataType {
	#[default]
	Unknown = 0,
	Byte = 1,
	UInt16 = 2,
	Int16 = 3,
	UInt32 = 4,
	Int32 = 5,
	Float32 = 6,
	Float64 = 7,
	CInt16 = 8,
	CInt32 = 9,
	CFloat32 = 10,
	CFloat64 = 11,
	UInt64 = 12,
	Int64 = 13,
	Int8 = 14,
}

impl DataType {
	pub fn from_code(code: u32) -> Result<DataType> {
		Ok(match code {
			0 => DataType::Unknown,
			1 => DataType::Byte,
			2 => DataType::UInt16,
			3 => DataType::Int16,
			4 => DataType::UInt32,
			5 => DataType::Int32,
			6 => DataType::Float32,
			7 => DataType::Float64,
			8 => DataType::CInt16,
			9 => DataType::CInt32,
			10 => DataType::CFloat32,
			11 => DataType::CFloat64,
			12 => DataType::UInt64,
			13 => DataType::Int64,
			14 => DataType::Int8,
			_ => bail!("unknown raster data type code {code}"),
		})
	}

	pub fn code(self) -> u32 {
		self as u32
	}

	/// Size of one sample in bytes; `0` for `Unknown`.
	pub fn size(self) -> usize {
		match self {
			DataType::Unknown => 0,
			DataType::Byte | DataType::Int8 => 1,
			DataType::UInt16 | DataType::Int16 => 2,
			DataType::UInt32 | DataType::Int32 | DataType::Float32 | DataType::CInt16 => 4,
			DataType::Float64 | DataType::CInt32 | DataType::CFloat32 | DataType::UInt64 | DataType::Int64 => 8,
			DataType::CFloat64 => 16,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			DataType::Unknown => "Unknown",
			DataType::Byte => "Byte",
			DataType::UInt16 => "UInt16",
			DataType::Int16 => "Int16",
			DataType::UInt32 => "UInt32",
			DataType::Int32 => "Int32",
			DataType::Float32 => "Float32",
			DataType::Float64 => "Float64",
			DataType::CInt16 => "CInt16",
			DataType::CInt32 => "CInt32",
			DataType::CFloat32 => "CFloat32",
			DataType::CFloat64 => "CFloat64",
			DataType::UInt64 => "UInt64",
			DataType::Int64 => "Int64",
			DataType::Int8 => "Int8",
		}
	}

	pub fn is_complex(self) -> bool {
		matches!(
			self,
			DataType::CInt16 | DataType::CInt32 | DataType::CFloat32 | DataType::CFloat64
		)
	}

	/// Types whose samples are copied byte for byte when source and
	/// destination agree.
	pub fn is_fast_path(self) -> bool {
		matches!(
			self,
			DataType::Byte | DataType::Int16 | DataType::UInt16 | DataType::Float32
		)
	}

	/// The type written to the destination buffer for a source of this type.
	pub fn output_type(self) -> DataType {
		if self.is_fast_path() {
			self
		} else {
			DataType::Float32
		}
	}
}

impl Display for DataType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// The sample type reported for a warp result.
///
/// Byte bands flagged as signed are still stored as `Byte` but reported with a
/// sentinel so consumers can reinterpret the samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RasterType {
	Data(DataType),
	SignedByte,
}

impl RasterType {
	pub const SIGNED_BYTE_CODE: u32 = 100;

	pub fn code(self) -> u32 {
		match self {
			RasterType::Data(data_type) => data_type.code(),
			RasterType::SignedByte => Self::SIGNED_BYTE_CODE,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			RasterType::Data(data_type) => data_type.name(),
			RasterType::SignedByte => "SignedByte",
		}
	}

	/// The storage type of the samples.
	pub fn data_type(self) -> DataType {
		match self {
			RasterType::Data(data_type) => data_type,
			RasterType::SignedByte => DataType::Byte,
		}
	}
}

impl From<DataType> for RasterType {
	fn from(value: DataType) -> Self {
		RasterType::Data(value)
	}
}
