//! INI serialization: [`LayerConfig`] → commented INI text.

use std::fmt::Write as _;

use super::settings::LayerConfig;
use super::size::format_size;

pub(super) fn to_config_string(config: &LayerConfig) -> String {
    let levels = &config.levels;
    let directory = config
        .cache
        .directory
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let empty_levels = levels
        .empty_levels
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let default_expiry = levels.default_expiry.map_or(0, |d| d.as_secs());

    let mut out = format!(
        r#"[layer]
; Layer name, also the default store subdirectory
name = {name}
; MIME type requested from the tile source
mime_type = {mime_type}
; File extension of persisted tiles
extension = {extension}
; Persistent store directory (empty = <cache dir>/terrastream/<name>)
directory = {directory}

[levels]
; Number of pyramid levels (1-30)
count = {count}
; Tile size at level 0, in degrees
level_zero_delta = {delta}
; Grid origin: latitude, longitude
origin = {origin_lat}, {origin_lon}
; Covered extent: min_lat, max_lat, min_lon, max_lon
sector = {min_lat}, {max_lat}, {min_lon}, {max_lon}
; Tile edge length in pixels
tile_size = {tile_size}
; Levels with no data, comma-separated
empty = {empty_levels}

[lod]
; Larger values select coarser tiles
split_scale = {split_scale}
; Load level-0 tiles synchronously from the store when missing
force_level_zero_loads = {force}

[cache]
; Resident bytes that trigger eviction
high_watermark = {high}
; Resident bytes eviction settles to
low_watermark = {low}

[expiry]
; Age after which persisted tiles are refetched (s, m, h, d; 0 = never)
default = {default_expiry}
"#,
        name = config.name,
        mime_type = config.format.mime_type,
        extension = config.format.extension,
        count = levels.level_count,
        delta = levels.level_zero_delta,
        origin_lat = levels.tile_origin.lat,
        origin_lon = levels.tile_origin.lon,
        min_lat = levels.sector.min_lat,
        max_lat = levels.sector.max_lat,
        min_lon = levels.sector.min_lon,
        max_lon = levels.sector.max_lon,
        tile_size = levels.tile_size,
        split_scale = config.lod.split_scale,
        force = config.lod.force_level_zero_loads,
        high = format_size(config.cache.high_watermark),
        low = format_size(config.cache.low_watermark),
    );

    for (level, expiry) in &levels.level_expiry {
        let _ = writeln!(out, "level_{} = {}", level, expiry.as_secs());
    }

    let _ = write!(
        out,
        r#"
[fetch]
; Concurrent fetch workers
workers = {}
; Fetches that may wait for a free worker
queue_capacity = {}
"#,
        config.fetch.workers, config.fetch.queue_capacity
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_output_round_trips_through_parser() {
        let mut config = LayerConfig::named("topo");
        config.levels.empty_levels = vec![0, 2];
        config.levels.default_expiry = Some(Duration::from_secs(3600));
        config.levels.level_expiry.insert(4, Duration::from_secs(60));
        config.cache.directory = Some("/srv/topo".into());
        config.lod.split_scale = 0.75;

        let parsed = LayerConfig::from_ini_str(&to_config_string(&config)).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_defaults_render_sizes() {
        let text = to_config_string(&LayerConfig::default());
        assert!(text.contains("high_watermark = 512MB"));
        assert!(text.contains("low_watermark = 384MB"));
        assert!(text.contains("sector = -90, 90, -180, 180"));
    }
}
