use std::fmt::{Debug, Display};

/// Numeric outcome of a warp invocation.
///
/// Failures carry one of the non-zero statuses. `Success` exists so callers
/// reporting numeric codes can map a whole result, see [`WarpStatus::of`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WarpStatus {
	Success = 0,
	/// The source dataset could not be opened.
	OpenFailure = 1,
	/// The requested band (or a needed overview) does not exist.
	BandNotFound = 2,
	/// A transform could not be created, or a geotransform could not be inverted.
	TransformFailure = 3,
	/// The request itself is malformed, e.g. a zero-sized destination.
	InvalidRequest = 4,
	/// Samples of the selected band could not be transferred into the output.
	ReadFailure = 5,
}

impl WarpStatus {
	/// Status of a finished invocation.
	pub fn of<T>(result: &Result<T, WarpError>) -> WarpStatus {
		match result {
			Ok(_) => WarpStatus::Success,
			Err(err) => err.status,
		}
	}

	pub fn code(&self) -> i32 {
		*self as i32
	}

	pub fn name(&self) -> &'static str {
		match self {
			WarpStatus::Success => "success",
			WarpStatus::OpenFailure => "open failure",
			WarpStatus::BandNotFound => "band not found",
			WarpStatus::TransformFailure => "transform failure",
			WarpStatus::InvalidRequest => "invalid request",
			WarpStatus::ReadFailure => "read failure",
		}
	}
}

/// A failed warp: the stage status plus the full error chain.
pub struct WarpError {
	status: WarpStatus,
	source: anyhow::Error,
}

impl WarpError {
	pub fn new(status: WarpStatus, source: anyhow::Error) -> Self {
		WarpError { status, source }
	}

	pub fn status(&self) -> WarpStatus {
		self.status
	}

	pub fn code(&self) -> i32 {
		self.status.code()
	}

	pub fn inner(&self) -> &anyhow::Error {
		&self.source
	}

	pub fn into_inner(self) -> anyhow::Error {
		self.source
	}
}

impl Display for WarpError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} (status {}): {:#}", self.status.name(), self.status.code(), self.source)
	}
}

impl Debug for WarpError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WarpError")
			.field("status", &self.status)
			.field("source", &self.source)
			.finish()
	}
}

impl std::error::Error for WarpError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		let source: &(dyn std::error::Error + 'static) = &*self.source;
		Some(source)
	}
}

/// Tags a fallible stage result with the status it fails with.
pub trait WarpStage<T> {
	fn stage(self, status: WarpStatus) -> Result<T, WarpError>;
}

impl<T> WarpStage<T> for anyhow::Result<T> {
	fn stage(self, status: WarpStatus) -> Result<T, WarpError> {
		self.map_err(|e| WarpError::new(status, e))
	}
}
