//! Level-of-detail tile selection.
//!
//! [`LodSelector::assemble`] runs once per frame on the render thread. It
//! reads residency and absence state, queues fetches for what is missing and
//! returns the ordered [`Tile`] list with fallback references.

mod oracle;
mod selector;
mod tile;

pub use oracle::{ViewerOracle, VisibilityOracle, EARTH_RADIUS_M};
pub use selector::{LodConfig, LodSelector, DEFAULT_SPLIT_SCALE};
pub use tile::{Tile, TileRef};
