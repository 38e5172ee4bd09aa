//! Tile layer: the per-frame entry point.
//!
//! A [`TileLayer`] ties selection, residency, the absence set and fetch
//! scheduling together for one tiled image source. The renderer calls
//! [`render_frame`](TileLayer::render_frame) once per frame.
//!
//! ```text
//!                   render_frame(oracle)
//!                          │
//!          ┌───────────────┼──────────────────┐
//!          ▼               ▼                  ▼
//!     LodSelector    ResidencyCache      FetchQueue::drain
//!     (assemble)     (resolve handles)         │
//!                                              ▼
//!                                     ExecutionService
//!                                     (FetchTask jobs)
//! ```

mod builder;
mod error;
mod frame;
mod tile_layer;

pub use builder::TileLayerBuilder;
pub use error::LayerError;
pub use frame::{Frame, FrameStats, ReferencePoint, RenderTile, TileSource};
pub use tile_layer::TileLayer;
