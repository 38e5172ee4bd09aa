//! INI parsing: `Ini` → [`LayerConfig`].
//!
//! Starts from `LayerConfig::default()` and overlays the values present.
//! This is the only place INI key names are mapped to fields.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::{LayerConfig, ResourceFormat};
use super::size::parse_size;
use crate::grid::{GeoPoint, Sector};

pub(super) fn parse_ini(ini: &Ini) -> Result<LayerConfig, ConfigFileError> {
    let mut config = LayerConfig::default();

    // [layer]
    if let Some(section) = ini.section(Some("layer")) {
        if let Some(v) = non_empty(section, "name") {
            config.name = v.to_string();
        }
        let mime_type = non_empty(section, "mime_type");
        let extension = non_empty(section, "extension");
        if mime_type.is_some() || extension.is_some() {
            let defaults = ResourceFormat::default();
            config.format = ResourceFormat::new(
                mime_type.unwrap_or(&defaults.mime_type),
                extension
                    .map(|e| e.trim_start_matches('.'))
                    .unwrap_or(&defaults.extension),
            );
        }
        if let Some(v) = non_empty(section, "directory") {
            config.cache.directory = Some(expand_tilde(v));
        }
    }

    // [levels]
    if let Some(section) = ini.section(Some("levels")) {
        let levels = &mut config.levels;
        if let Some(v) = section.get("count") {
            levels.level_count = parse_value("levels", "count", v, "must be an integer 1-30")?;
        }
        if let Some(v) = section.get("level_zero_delta") {
            levels.level_zero_delta = parse_value(
                "levels",
                "level_zero_delta",
                v,
                "must be a tile size in degrees",
            )?;
        }
        if let Some(v) = section.get("origin") {
            let [lat, lon] = parse_floats::<2>("levels", "origin", v)?;
            levels.tile_origin = GeoPoint::new(lat, lon);
        }
        if let Some(v) = section.get("sector") {
            let [min_lat, max_lat, min_lon, max_lon] = parse_floats::<4>("levels", "sector", v)?;
            levels.sector = Sector::new(min_lat, max_lat, min_lon, max_lon);
        }
        if let Some(v) = section.get("tile_size") {
            levels.tile_size =
                parse_value("levels", "tile_size", v, "must be a size in pixels")?;
        }
        if let Some(v) = section.get("empty") {
            levels.empty_levels = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_value("levels", "empty", s, "must be a list of level numbers"))
                .collect::<Result<_, _>>()?;
        }
    }

    // [lod]
    if let Some(section) = ini.section(Some("lod")) {
        if let Some(v) = section.get("split_scale") {
            let scale: f64 = parse_value("lod", "split_scale", v, "must be a number")?;
            if !scale.is_finite() {
                return Err(invalid("lod", "split_scale", v, "must be finite"));
            }
            config.lod.split_scale = scale;
        }
        if let Some(v) = section.get("force_level_zero_loads") {
            config.lod.force_level_zero_loads = parse_bool("lod", "force_level_zero_loads", v)?;
        }
    }

    // [cache]
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("high_watermark") {
            config.cache.high_watermark = parse_size(v)
                .map_err(|e| invalid("cache", "high_watermark", v, &e.to_string()))?;
        }
        if let Some(v) = section.get("low_watermark") {
            config.cache.low_watermark = parse_size(v)
                .map_err(|e| invalid("cache", "low_watermark", v, &e.to_string()))?;
        }
    }

    // [expiry]
    if let Some(section) = ini.section(Some("expiry")) {
        for (key, value) in section.iter() {
            if key == "default" {
                let expiry = parse_duration("expiry", key, value)?;
                config.levels.default_expiry = (!expiry.is_zero()).then_some(expiry);
            } else if let Some(level) = key.strip_prefix("level_") {
                let level: u8 = level.parse().map_err(|_| {
                    invalid("expiry", key, value, "key must be 'default' or 'level_<n>'")
                })?;
                let expiry = parse_duration("expiry", key, value)?;
                config.levels.level_expiry.insert(level, expiry);
            } else {
                return Err(invalid(
                    "expiry",
                    key,
                    value,
                    "key must be 'default' or 'level_<n>'",
                ));
            }
        }
    }

    // [fetch]
    if let Some(section) = ini.section(Some("fetch")) {
        if let Some(v) = section.get("workers") {
            config.fetch.workers = parse_positive("fetch", "workers", v)?;
        }
        if let Some(v) = section.get("queue_capacity") {
            config.fetch.queue_capacity = parse_positive("fetch", "queue_capacity", v)?;
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn parse_value<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn parse_positive(section: &str, key: &str, value: &str) -> Result<usize, ConfigFileError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(section, key, value, "must be a positive integer")),
    }
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "must be true or false")),
    }
}

/// Comma-separated list of exactly `N` numbers.
fn parse_floats<const N: usize>(
    section: &str,
    key: &str,
    value: &str,
) -> Result<[f64; N], ConfigFileError> {
    let reason = format!("must be {} comma-separated numbers", N);
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(invalid(section, key, value, &reason));
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = parse_value(section, key, part, &reason)?;
    }
    Ok(out)
}

/// Duration in seconds, or with an `s`/`m`/`h`/`d` suffix. Zero means never.
pub(super) fn parse_duration(
    section: &str,
    key: &str,
    value: &str,
) -> Result<Duration, ConfigFileError> {
    let v = value.trim().to_ascii_lowercase();
    let (number, unit) = match v.char_indices().last() {
        Some((i, 's')) => (&v[..i], 1),
        Some((i, 'm')) => (&v[..i], 60),
        Some((i, 'h')) => (&v[..i], 3600),
        Some((i, 'd')) => (&v[..i], 86_400),
        _ => (v.as_str(), 1),
    };
    number
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit))
        .map(Duration::from_secs)
        .ok_or_else(|| {
            invalid(
                section,
                key,
                value,
                "must be seconds or a number with s, m, h or d suffix",
            )
        })
}

pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
