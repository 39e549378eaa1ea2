use std::fmt::Debug;

/// A sub-rectangle of the nominal output grid.
///
/// Only the pixels inside the window are materialized; the offsets locate the
/// window inside the nominal grid.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DestinationWindow {
	pub x_offset: usize,
	pub y_offset: usize,
	pub width: usize,
	pub height: usize,
}

impl DestinationWindow {
	pub fn new(x_offset: usize, y_offset: usize, width: usize, height: usize) -> Self {
		DestinationWindow {
			x_offset,
			y_offset,
			width,
			height,
		}
	}

	/// The whole nominal grid.
	pub fn full(width: usize, height: usize) -> Self {
		DestinationWindow::new(0, 0, width, height)
	}

	pub fn pixel_count(&self) -> usize {
		self.width * self.height
	}

	pub fn is_empty(&self) -> bool {
		self.width == 0 || self.height == 0
	}

	/// Center of window-local pixel `(x, y)` in nominal output coordinates.
	#[inline]
	pub fn pixel_center(&self, x: usize, y: usize) -> (f64, f64) {
		(
			(self.x_offset + x) as f64 + 0.5,
			(self.y_offset + y) as f64 + 0.5,
		)
	}
}

impl Debug for DestinationWindow {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"DestinationWindow({}, {}, {}x{})",
			self.x_offset, self.y_offset, self.width, self.height
		)
	}
}
