//! Persistent store providers.
//!
//! - [`DiskStore`]: files under a root directory
//! - [`MemoryStore`]: process-local map, for tests and simulations

mod disk;
mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;
