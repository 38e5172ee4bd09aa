//! TerraStream - level-of-detail tile streaming for globe renderers
//!
//! Selects which tiles of a geographic quadtree pyramid to draw for the
//! current viewer, keeps decoded tile resources resident within a byte
//! budget, and fetches missing tiles in the background from a persistent
//! store or a remote source.
//!
//! # Modules
//!
//! - [`grid`]: tile addresses, sectors and the level pyramid
//! - [`lod`]: per-frame quadtree selection with ancestor fallback
//! - [`cache`]: residency cache, persistent store and absence marks
//! - [`fetch`]: request queue, worker pool and fetch tasks
//! - [`layer`]: the [`TileLayer`](layer::TileLayer) frame driver
//! - [`config`]: layer configuration and INI files
//! - [`telemetry`]: layer counters and snapshots
//! - [`logging`]: tracing subscriber setup

pub mod cache;
pub mod config;
pub mod fetch;
pub mod grid;
pub mod layer;
pub mod lod;
pub mod logging;
pub mod telemetry;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
