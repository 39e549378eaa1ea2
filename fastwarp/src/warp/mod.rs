//! The warp pipeline and its stages.

mod clip;
mod extent;
mod fast_warp;
mod mapper;
mod overview;
mod reader;

pub use clip::{clip_window, round_coord};
pub use extent::{ReprojectExtent, measure_extent};
pub use fast_warp::{FastWarper, WarpMetrics, WarpOutput, WarpRequest};
pub use mapper::{BlockPixels, PixelMapping, map_pixels};
pub use overview::{apply_overview, downsampling_ratio, select_overview_level};
pub use reader::{ReadStats, read_and_scatter};
