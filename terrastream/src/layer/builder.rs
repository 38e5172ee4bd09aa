//! Assembly of a [`TileLayer`] from configuration and collaborators.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tracing::info;

use super::error::LayerError;
use super::tile_layer::TileLayer;
use crate::cache::{AbsenceMarks, DiskStore, PersistentStore, ResidencyCache, TileStore};
use crate::config::LayerConfig;
use crate::fetch::{Decoder, ExecutionService, FetchContext, FetchQueue, ResourceFetcher};
use crate::grid::TileAddress;
use crate::lod::LodSelector;
use crate::telemetry::LayerMetrics;

type Release<H> = Box<dyn Fn(TileAddress, H) + Send + Sync>;

/// Builder for [`TileLayer`].
///
/// The fetcher, decoder and execution service are required. The persistent
/// store defaults to a [`DiskStore`] at
/// [`LayerConfig::store_directory`].
///
/// ```ignore
/// let pool = Arc::new(WorkerPool::start(config.fetch));
/// let layer = TileLayerBuilder::new(config)
///     .fetcher(Arc::new(HttpFetcher::new(url)))
///     .decoder(Arc::new(TextureDecoder))
///     .executor(pool.clone())
///     .build()?;
///
/// let frame = layer.render_frame(&camera);
/// ```
pub struct TileLayerBuilder<H> {
    config: LayerConfig,
    fetcher: Option<Arc<dyn ResourceFetcher>>,
    decoder: Option<Arc<dyn Decoder<H>>>,
    executor: Option<Arc<dyn ExecutionService>>,
    store: Option<Arc<dyn PersistentStore>>,
    release: Option<Release<H>>,
    metrics: Option<Arc<LayerMetrics>>,
}

impl<H> TileLayerBuilder<H>
where
    H: Clone + Send + Sync + 'static,
{
    pub fn new(config: LayerConfig) -> Self {
        Self {
            config,
            fetcher: None,
            decoder: None,
            executor: None,
            store: None,
            release: None,
            metrics: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn Decoder<H>>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ExecutionService>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Use `store` instead of a directory-backed store.
    pub fn store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Dispose of evicted or replaced handles with `release`.
    pub fn on_release<F>(mut self, release: F) -> Self
    where
        F: Fn(TileAddress, H) + Send + Sync + 'static,
    {
        self.release = Some(Box::new(release));
        self
    }

    /// Share `metrics` instead of creating a fresh set.
    pub fn metrics(mut self, metrics: Arc<LayerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<TileLayer<H>, LayerError> {
        let config = self.config;
        let levels = Arc::new(config.level_set()?);
        let watermarks = config.watermarks()?;
        let fetcher = self.fetcher.ok_or(LayerError::Missing("resource fetcher"))?;
        let decoder = self.decoder.ok_or(LayerError::Missing("decoder"))?;
        let executor = self
            .executor
            .ok_or(LayerError::Missing("execution service"))?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(DiskStore::new(config.store_directory())));
        let cache = Arc::new(match self.release {
            Some(release) => ResidencyCache::new(watermarks, release),
            None => ResidencyCache::without_release(watermarks),
        });
        let absence = Arc::new(AbsenceMarks::load(Arc::clone(&store)));
        let metrics = self.metrics.unwrap_or_default();
        let queue = FetchQueue::new();

        let context = Arc::new(FetchContext::new(
            Arc::clone(&levels),
            TileStore::new(store, config.format.extension.clone()),
            Arc::clone(&cache),
            Arc::clone(&absence),
            fetcher,
            decoder,
            Arc::clone(&metrics),
            config.format.mime_type.clone(),
        ));

        let selector = LodSelector::new(
            config.lod,
            Arc::clone(&levels),
            Arc::clone(&cache),
            Arc::clone(&absence),
            queue.clone(),
        )
        .with_metrics(Arc::clone(&metrics))
        .with_loader(Arc::clone(&context));

        let name = config.display_name().to_string();
        info!(
            layer = %name,
            levels = levels.level_count(),
            top_level_tiles = levels.top_level_tiles().len(),
            absent = absence.len(),
            "Tile layer ready"
        );

        Ok(TileLayer {
            name,
            levels,
            cache,
            absence,
            queue,
            selector,
            context,
            executor,
            metrics,
            frames: AtomicU64::new(0),
        })
    }
}
