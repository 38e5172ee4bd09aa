//! Layer configuration.
//!
//! [`LayerConfig`] carries everything needed to build a
//! [`TileLayer`](crate::layer::TileLayer). It can be constructed in code or
//! loaded from an INI file:
//!
//! ```text
//! [layer]   name, mime_type, extension, directory
//! [levels]  count, level_zero_delta, origin, sector, tile_size, empty
//! [lod]     split_scale, force_level_zero_loads
//! [cache]   high_watermark, low_watermark      (sizes like "512MB")
//! [expiry]  default, level_<n>                 (durations like "7d")
//! [fetch]   workers, queue_capacity
//! ```

mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use file::ConfigFileError;
pub use settings::{
    default_store_directory, CacheSettings, LayerConfig, ResourceFormat, DEFAULT_LAYER_NAME,
};
pub use size::{format_size, parse_size, SizeParseError};
