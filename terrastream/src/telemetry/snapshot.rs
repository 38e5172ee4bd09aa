//! Point-in-time telemetry snapshot.

use std::fmt;
use std::time::Duration;

/// Immutable copy of [`LayerMetrics`](super::LayerMetrics) counters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub uptime: Duration,

    // === Selection ===
    pub frames: u64,
    pub tiles_selected: u64,
    /// Tiles drawn with their own resource
    pub tiles_resident: u64,
    /// Tiles drawn with an ancestor's resource
    pub tiles_fallback: u64,
    /// Tiles with nothing to draw
    pub tiles_missing: u64,
    pub eager_loads: u64,

    // === Queue ===
    pub fetches_queued: u64,
    pub fetches_deduplicated: u64,
    pub fetches_submitted: u64,
    /// Requests dropped because the worker pool was full
    pub fetches_dropped: u64,
    pub fetches_active: usize,

    // === Outcomes ===
    pub store_hits: u64,
    pub fetch_successes: u64,
    pub bytes_fetched: u64,
    pub absence_marked: u64,
    pub transient_failures: u64,
    pub corrupt_files: u64,
    pub expired_files: u64,

    // === Cache ===
    pub evictions: u64,
}

impl TelemetrySnapshot {
    /// Share of selected tiles drawn with their own resource (0.0 - 1.0).
    pub fn residency_rate(&self) -> f64 {
        if self.tiles_selected == 0 {
            0.0
        } else {
            self.tiles_resident as f64 / self.tiles_selected as f64
        }
    }

    /// Average tiles selected per frame.
    pub fn tiles_per_frame(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.tiles_selected as f64 / self.frames as f64
        }
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Layer Telemetry (uptime: {:.1}s)", self.uptime.as_secs_f64())?;
        writeln!(f, "─────────────────────────────────────────")?;
        writeln!(f)?;

        writeln!(f, "Selection:")?;
        writeln!(
            f,
            "  Frames: {} ({:.1} tiles/frame)",
            self.frames,
            self.tiles_per_frame()
        )?;
        writeln!(
            f,
            "  Resident: {} ({:.1}%)",
            self.tiles_resident,
            self.residency_rate() * 100.0
        )?;
        writeln!(f, "  Fallback: {}", self.tiles_fallback)?;
        writeln!(f, "  Missing: {}", self.tiles_missing)?;
        writeln!(f, "  Eager loads: {}", self.eager_loads)?;
        writeln!(f)?;

        writeln!(f, "Fetch queue:")?;
        writeln!(
            f,
            "  Queued: {} (deduplicated {})",
            self.fetches_queued, self.fetches_deduplicated
        )?;
        writeln!(
            f,
            "  Submitted: {} (dropped {})",
            self.fetches_submitted, self.fetches_dropped
        )?;
        writeln!(f, "  Active: {}", self.fetches_active)?;
        writeln!(f)?;

        writeln!(f, "Outcomes:")?;
        writeln!(f, "  Store hits: {}", self.store_hits)?;
        writeln!(
            f,
            "  Fetched: {} ({} bytes)",
            self.fetch_successes, self.bytes_fetched
        )?;
        writeln!(f, "  Marked absent: {}", self.absence_marked)?;
        writeln!(f, "  Transient failures: {}", self.transient_failures)?;
        writeln!(f, "  Corrupt files: {}", self.corrupt_files)?;
        writeln!(f, "  Expired files: {}", self.expired_files)?;
        writeln!(f)?;

        writeln!(f, "Cache:")?;
        write!(f, "  Evictions: {}", self.evictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_with_no_frames() {
        let snapshot = TelemetrySnapshot::default();
        assert_eq!(snapshot.residency_rate(), 0.0);
        assert_eq!(snapshot.tiles_per_frame(), 0.0);
    }

    #[test]
    fn test_rates() {
        let snapshot = TelemetrySnapshot {
            frames: 2,
            tiles_selected: 8,
            tiles_resident: 6,
            ..Default::default()
        };
        assert_eq!(snapshot.residency_rate(), 0.75);
        assert_eq!(snapshot.tiles_per_frame(), 4.0);
    }

    #[test]
    fn test_display_mentions_sections() {
        let text = TelemetrySnapshot::default().to_string();
        assert!(text.contains("Selection:"));
        assert!(text.contains("Fetch queue:"));
        assert!(text.contains("Evictions: 0"));
    }
}
