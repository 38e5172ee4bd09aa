//! Simulate command - fly a synthetic viewer over a tile layer.
//!
//! Tiles come from an in-process source that answers after a fixed latency,
//! so the run exercises selection, fallback, fetch scheduling, persistence
//! and eviction without a network.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use terrastream::cache::{MemoryStore, ResidencyStats};
use terrastream::config::{format_size, LayerConfig};
use terrastream::fetch::{
    BoxFuture, DecodeError, Decoded, Decoder, FetchError, FetchedPayload, ResourceFetcher,
    WorkerPool,
};
use terrastream::grid::{GeoPoint, TileAddress};
use terrastream::layer::{Frame, TileLayer, TileLayerBuilder};
use terrastream::lod::ViewerOracle;
use terrastream::telemetry::TelemetrySnapshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::load;
use crate::error::CliError;

const PAYLOAD_PREFIX: &[u8] = b"synthetic:";

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Layer configuration file (built-in defaults when omitted)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Number of frames to render
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Starting eye position as "lat,lon"
    #[arg(long, value_parser = parse_point, default_value = "45.0,6.0")]
    from: GeoPoint,

    /// Final eye position as "lat,lon"
    #[arg(long, value_parser = parse_point, default_value = "46.0,8.0")]
    to: GeoPoint,

    /// Starting altitude in metres
    #[arg(long, default_value_t = 2_000_000.0)]
    altitude: f64,

    /// Final altitude in metres
    #[arg(long, default_value_t = 5_000.0)]
    final_altitude: f64,

    /// Time between frames in milliseconds
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Simulated source latency in milliseconds
    #[arg(long, default_value_t = 25)]
    latency_ms: u64,

    /// Report every Nth tile of the deepest level as missing at the source
    #[arg(long, default_value_t = 0)]
    missing_every: u32,

    /// Persist tiles in memory instead of the configured store directory
    #[arg(long)]
    memory_store: bool,

    /// Print every frame instead of every tenth
    #[arg(long)]
    every_frame: bool,
}

fn parse_point(s: &str) -> Result<GeoPoint, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lon\", got '{}'", s))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude '{}'", lat.trim()))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude '{}'", lon.trim()))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("position {},{} is off the globe", lat, lon));
    }
    Ok(GeoPoint::new(lat, lon))
}

/// Handle of a synthetic texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Texture {
    address: TileAddress,
}

/// Answers every request after `latency`, except for the deepest-level tiles
/// selected by `missing_every`.
struct SyntheticSource {
    latency: Duration,
    missing_every: u32,
    last_level: u8,
}

impl SyntheticSource {
    fn is_missing(&self, address: &TileAddress) -> bool {
        self.missing_every > 0
            && address.level == self.last_level
            && (address.row + address.col).rem_euclid(self.missing_every as i32) == 0
    }
}

impl ResourceFetcher for SyntheticSource {
    fn fetch(
        &self,
        address: TileAddress,
        format: &str,
    ) -> BoxFuture<'_, Result<FetchedPayload, FetchError>> {
        let content_type = format.to_string();
        let missing = self.is_missing(&address);
        let latency = self.latency;
        Box::pin(async move {
            tokio::time::sleep(latency).await;
            if missing {
                return Err(FetchError::NotFound);
            }
            let mut bytes = PAYLOAD_PREFIX.to_vec();
            bytes.extend_from_slice(address.to_string().as_bytes());
            Ok(FetchedPayload::new(bytes, content_type))
        })
    }
}

/// Decodes synthetic payloads into RGBA-sized textures.
struct SyntheticDecoder {
    texture_bytes: u64,
}

impl Decoder<Texture> for SyntheticDecoder {
    fn decode(&self, address: &TileAddress, bytes: &[u8]) -> Result<Decoded<Texture>, DecodeError> {
        if !bytes.starts_with(PAYLOAD_PREFIX) {
            return Err(DecodeError::Malformed("missing synthetic header".into()));
        }
        Ok(Decoded {
            handle: Texture { address: *address },
            size_bytes: self.texture_bytes,
        })
    }
}

/// Totals reported at the end of a run.
struct SimulationSummary {
    frames: u64,
    telemetry: TelemetrySnapshot,
    residency: ResidencyStats,
    absent: usize,
    released: u64,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => load(path)?,
        None => LayerConfig::named("simulation"),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let summary = runtime.block_on(simulate(&args, config))?;

    println!();
    print!("{}", summary.telemetry);
    println!();
    println!("Residency");
    println!("─────────");
    println!(
        "  Resident: {} tiles, {}",
        summary.residency.entries,
        format_size(summary.residency.total_bytes)
    );
    println!("  Evicted:  {}", summary.residency.evictions);
    println!("  Released: {}", summary.released);
    println!("  Absent:   {}", summary.absent);
    println!("  Frames:   {}", summary.frames);
    Ok(())
}

async fn simulate(args: &SimulateArgs, config: LayerConfig) -> Result<SimulationSummary, CliError> {
    let levels = config.level_set().map_err(terrastream::layer::LayerError::from)?;
    let tile_size = config.levels.tile_size;

    let pool = Arc::new(WorkerPool::start(config.fetch));
    let released = Arc::new(AtomicU64::new(0));
    let release_count = Arc::clone(&released);

    let mut builder = TileLayerBuilder::new(config)
        .fetcher(Arc::new(SyntheticSource {
            latency: Duration::from_millis(args.latency_ms),
            missing_every: args.missing_every,
            last_level: levels.last_level(),
        }))
        .decoder(Arc::new(SyntheticDecoder {
            texture_bytes: u64::from(tile_size) * u64::from(tile_size) * 4,
        }))
        .executor(pool.clone())
        .on_release(move |_address, _texture: Texture| {
            release_count.fetch_add(1, Ordering::Relaxed);
        });
    if args.memory_store {
        builder = builder.store(Arc::new(MemoryStore::new()));
    }
    let layer = builder.build()?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    println!("TerraStream simulation v{}", terrastream::VERSION);
    println!("========================");
    println!();
    println!("Layer:  {}", layer.name());
    println!("Levels: {}", layer.levels().level_count());
    println!(
        "Path:   {} @ {:.0}m -> {} @ {:.0}m over {} frames",
        args.from, args.altitude, args.to, args.final_altitude, args.frames
    );
    println!();

    let mut oracle = ViewerOracle::new(args.from, args.altitude, tile_size);
    let mut interval = tokio::time::interval(Duration::from_millis(args.frame_ms.max(1)));
    let mut rendered = 0;
    for index in 0..args.frames {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                println!("Interrupted after {} frames", rendered);
                break;
            }
            _ = interval.tick() => {}
        }

        let t = if args.frames > 1 {
            index as f64 / (args.frames - 1) as f64
        } else {
            1.0
        };
        let (eye, altitude) = viewer_at(args, t);
        oracle.move_to(eye, altitude);

        let frame = layer.render_frame(&oracle);
        rendered += 1;
        if args.every_frame || frame.number % 10 == 0 || index + 1 == args.frames {
            print_frame(&frame, &oracle, &layer);
        }
    }

    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        while layer.has_pending_fetches() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if settled.is_err() {
        warn!("Fetches still pending at shutdown");
    }
    pool.shutdown().await;
    info!(frames = rendered, "Simulation finished");

    Ok(SimulationSummary {
        frames: rendered,
        telemetry: layer.metrics().snapshot(),
        residency: layer.cache().stats(),
        absent: layer.absence_marks().len(),
        released: released.load(Ordering::Relaxed),
    })
}

/// Eye position and altitude at `t` in 0..=1. Altitude changes geometrically.
fn viewer_at(args: &SimulateArgs, t: f64) -> (GeoPoint, f64) {
    let lat = args.from.lat + (args.to.lat - args.from.lat) * t;
    let lon = args.from.lon + (args.to.lon - args.from.lon) * t;
    let start = args.altitude.max(1.0);
    let end = args.final_altitude.max(1.0);
    (GeoPoint::new(lat, lon), start * (end / start).powf(t))
}

fn print_frame(frame: &Frame<Texture>, oracle: &ViewerOracle, layer: &TileLayer<Texture>) {
    let stats = frame.stats();
    println!(
        "frame {:>5}  alt {:>9.0}m  tiles {:>4} (res {:>4} fb {:>4} miss {:>4})  L{:<2}  fetch +{} -{}  resident {}",
        frame.number,
        oracle.altitude(),
        frame.tiles.len(),
        stats.resident,
        stats.fallback,
        stats.missing,
        stats.max_level,
        frame.drained.submitted,
        frame.drained.dropped,
        format_size(layer.cache().size_bytes()),
    );
}
