//! Layer telemetry.
//!
//! Lock-free counters updated from the render thread (selection, queueing)
//! and from fetch workers (outcomes, evictions).
//!
//! ```text
//! TileLayer / fetch tasks ───► LayerMetrics ───► TelemetrySnapshot ───► CLI
//!                              (atomics)         (point-in-time copy)
//! ```

mod metrics;
mod snapshot;

pub use metrics::LayerMetrics;
pub use snapshot::TelemetrySnapshot;
