//! Tile caching: in-memory residency and persistent storage.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────┐    ┌────────────────────────┐
//! │   ResidencyCache<H>    │    │      AbsenceMarks      │
//! │ address → handle (LRU) │    │ address set (negative) │
//! └────────────────────────┘    └───────────┬────────────┘
//!                                           │ absent.json
//! ┌────────────────────────┐                │
//! │       TileStore        │                │
//! │ address → tile path    │                │
//! │ expiry check           │                │
//! └───────────┬────────────┘                │
//!             ▼                             ▼
//! ┌─────────────────────────────────────────────────────┐
//! │              Arc<dyn PersistentStore>               │
//! │        DiskStore (files) / MemoryStore (map)        │
//! └─────────────────────────────────────────────────────┘
//! ```

mod absence;
pub mod providers;
mod residency;
mod store;

pub use absence::{AbsenceMarks, ABSENCE_INDEX_PATH};
pub use providers::{DiskStore, MemoryStore};
pub use residency::{
    CacheWatermarks, ReleaseFn, ResidencyCache, ResidencyStats, ResourceRecord, WatermarkError,
};
pub use store::{PersistentStore, StoreError, TileStore};
