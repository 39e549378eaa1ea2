mod block_grid;
mod data_type;
mod destination_window;
mod geo_transform;

pub use block_grid::{BlockGrid, BlockIndex};
pub use data_type::{DataType, RasterType};
pub use destination_window::DestinationWindow;
pub use geo_transform::GeoTransform;
