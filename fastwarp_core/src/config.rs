use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::{
	fs::File,
	io::{BufReader, Read},
	path::Path,
};

/// WKT of WGS 84, used when neither request nor dataset name a source CRS.
pub const WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;

/// Tuning knobs of a warper.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WarpConfig {
	/// Maximum number of cached transform contexts.
	pub cache_capacity: usize,

	/// Maximum error, in output pixels, of the approximated row transform.
	pub approx_tolerance: f64,

	/// Absolute tolerance when matching an overview ratio to the target ratio.
	pub overview_tolerance: f64,

	/// Threads reading source blocks. Defaults to the number of CPUs.
	pub block_workers: Option<usize>,

	/// Source CRS used when neither the request nor the dataset has one.
	pub fallback_projection: String,

	/// No-data value used when the band does not define one.
	pub fallback_no_data: f64,

	/// Recognition and opening of subdataset references.
	pub subdataset: SubdatasetConfig,
}

impl Default for WarpConfig {
	fn default() -> Self {
		WarpConfig {
			cache_capacity: 1024,
			approx_tolerance: 0.125,
			overview_tolerance: 0.1,
			block_workers: None,
			fallback_projection: WGS84_WKT.to_string(),
			fallback_no_data: -1e10,
			subdataset: SubdatasetConfig::default(),
		}
	}
}

impl WarpConfig {
	pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
		let config: WarpConfig = serde_yaml_ng::from_reader(reader)?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_string(text: &str) -> Result<Self> {
		let config: WarpConfig = serde_yaml_ng::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_path(path: &Path) -> Result<Self> {
		let file = File::open(path).with_context(|| format!("opening config file {path:?}"))?;
		WarpConfig::from_reader(BufReader::new(file)).with_context(|| format!("parsing config file {path:?}"))
	}

	pub fn validate(&self) -> Result<()> {
		ensure!(self.cache_capacity > 0, "cache_capacity must be positive");
		ensure!(
			self.approx_tolerance >= 0.0,
			"approx_tolerance must not be negative, got {}",
			self.approx_tolerance
		);
		ensure!(
			self.overview_tolerance >= 0.0,
			"overview_tolerance must not be negative, got {}",
			self.overview_tolerance
		);
		ensure!(self.block_workers != Some(0), "block_workers must be positive");
		Ok(())
	}

	/// Effective number of block workers.
	pub fn block_workers(&self) -> usize {
		self.block_workers.unwrap_or_else(num_cpus::get).max(1)
	}
}

/// Paths naming a variable inside a container file, e.g. `NETCDF:"file.nc":var`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SubdatasetConfig {
	pub prefixes: Vec<String>,
	pub suffixes: Vec<String>,
	/// Drivers allowed to open a subdataset reference.
	pub drivers: Vec<String>,
}

impl Default for SubdatasetConfig {
	fn default() -> Self {
		SubdatasetConfig {
			prefixes: vec!["NETCDF:".to_string()],
			suffixes: vec![".nc".to_string()],
			drivers: vec!["netCDF".to_string()],
		}
	}
}

impl SubdatasetConfig {
	pub fn matches(&self, path: &str) -> bool {
		self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
			|| self.suffixes.iter().any(|s| path.ends_with(s.as_str()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use std::io::Write;

	#[test]
	fn parse_empty_config() {
		assert_eq!(WarpConfig::from_string("").unwrap(), WarpConfig::default());
	}

	#[test]
	fn parse_partial_config() {
		let config = WarpConfig::from_string("cache_capacity: 8\nblock_workers: 3\nsubdataset:\n  suffixes: [\".nc4\"]\n")
			.unwrap();
		assert_eq!(config.cache_capacity, 8);
		assert_eq!(config.block_workers(), 3);
		assert_eq!(config.approx_tolerance, 0.125);
		assert_eq!(config.subdataset.prefixes, vec!["NETCDF:".to_string()]);
		assert_eq!(config.subdataset.suffixes, vec![".nc4".to_string()]);
	}

	#[test]
	fn parse_invalid_config() {
		assert!(WarpConfig::from_string("cache_size: 3").is_err());
		assert!(WarpConfig::from_string("cache_capacity: 0").is_err());
		assert!(WarpConfig::from_string("block_workers: 0").is_err());
		assert!(WarpConfig::from_string("approx_tolerance: -1").is_err());
	}

	#[test]
	fn parse_from_path() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "fallback_no_data: 0\noverview_tolerance: 0.25").unwrap();
		let config = WarpConfig::from_path(file.path()).unwrap();
		assert_eq!(config.fallback_no_data, 0.0);
		assert_eq!(config.overview_tolerance, 0.25);

		assert!(WarpConfig::from_path(Path::new("/does/not/exist.yml")).is_err());
	}

	#[test]
	fn default_workers_follow_cpu_count() {
		assert_eq!(WarpConfig::default().block_workers(), num_cpus::get().max(1));
	}

	#[test]
	fn subdataset_matching() {
		let config = SubdatasetConfig::default();
		assert!(config.matches("NETCDF:\"/data/file.nc\":sst"));
		assert!(config.matches("/data/file.nc"));
		assert!(!config.matches("/data/file.tif"));
	}
}
