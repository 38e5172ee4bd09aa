//! Layer settings with defaults.

use std::path::PathBuf;

use crate::cache::{CacheWatermarks, WatermarkError};
use crate::fetch::WorkerPoolConfig;
use crate::grid::{LevelSet, LevelSetConfig, LevelSetError};
use crate::lod::LodConfig;

/// Default layer name.
pub const DEFAULT_LAYER_NAME: &str = "default";

/// How tile resources are requested and stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFormat {
    /// MIME type requested from the fetcher.
    pub mime_type: String,
    /// File extension of persisted tiles, without the dot.
    pub extension: String,
}

impl ResourceFormat {
    pub fn new(mime_type: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            extension: extension.into(),
        }
    }
}

impl Default for ResourceFormat {
    fn default() -> Self {
        Self::new("image/png", "png")
    }
}

/// Residency budget and persistent store location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Resident bytes that trigger eviction.
    pub high_watermark: u64,
    /// Resident bytes eviction settles to.
    pub low_watermark: u64,
    /// Persistent store root. `None` uses [`default_store_directory`].
    pub directory: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let watermarks = CacheWatermarks::default();
        Self {
            high_watermark: watermarks.high(),
            low_watermark: watermarks.low(),
            directory: None,
        }
    }
}

/// Complete configuration of one tile layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerConfig {
    pub name: String,
    pub format: ResourceFormat,
    pub levels: LevelSetConfig,
    pub lod: LodConfig,
    pub cache: CacheSettings,
    pub fetch: WorkerPoolConfig,
}

impl LayerConfig {
    /// Defaults with the given layer name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Layer name, or [`DEFAULT_LAYER_NAME`] when unset.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            DEFAULT_LAYER_NAME
        } else {
            &self.name
        }
    }

    /// Build the validated level set.
    pub fn level_set(&self) -> Result<LevelSet, LevelSetError> {
        LevelSet::new(&self.levels)
    }

    /// Build the validated cache watermarks.
    pub fn watermarks(&self) -> Result<CacheWatermarks, WatermarkError> {
        CacheWatermarks::new(self.cache.high_watermark, self.cache.low_watermark)
    }

    /// Directory of the persistent store.
    pub fn store_directory(&self) -> PathBuf {
        self.cache
            .directory
            .clone()
            .unwrap_or_else(|| default_store_directory(self.display_name()))
    }
}

/// `<user cache dir>/terrastream/<layer>`, or a relative path when the
/// platform has no cache directory.
pub fn default_store_directory(layer: &str) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("terrastream")
        .join(layer)
}
