//! Metrics for the harmonization and correlation pipeline
//!
//! Metrics are recorded through the `metrics` facade with Prometheus naming
//! conventions. Until `init()` installs a recorder every call is a no-op,
//! which keeps library users and tests free of global state.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Cases metrics
    CasesRaw,
    CasesRetained,

    // Climate metrics
    StationFilesParsed,
    StationFilesFailed,
    StationParseDuration,
    GridCellsInterpolated,
    GridCellsMeanFilled,
    GridCellsWinsorized,

    // Analysis metrics
    CorrelationsComputed,

    // Cache metrics
    CacheHits,
    CacheMisses,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::CasesRaw => "arbo_cases_raw_total",
            MetricName::CasesRetained => "arbo_cases_retained_total",

            MetricName::StationFilesParsed => "arbo_station_files_parsed_total",
            MetricName::StationFilesFailed => "arbo_station_files_failed_total",
            MetricName::StationParseDuration => "arbo_station_parse_duration_seconds",
            MetricName::GridCellsInterpolated => "arbo_grid_cells_interpolated_total",
            MetricName::GridCellsMeanFilled => "arbo_grid_cells_mean_filled_total",
            MetricName::GridCellsWinsorized => "arbo_grid_cells_winsorized_total",

            MetricName::CorrelationsComputed => "arbo_correlations_computed_total",

            MetricName::CacheHits => "arbo_cache_hits_total",
            MetricName::CacheMisses => "arbo_cache_misses_total",
        }
    }

    /// Get all metric names as an iterator
    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            CasesRaw,
            CasesRetained,
            StationFilesParsed,
            StationFilesFailed,
            StationParseDuration,
            GridCellsInterpolated,
            GridCellsMeanFilled,
            GridCellsWinsorized,
            CorrelationsComputed,
            CacheHits,
            CacheMisses,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it again is harmless.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Prometheus text exposition, if a recorder was installed
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

// ============================================================================
// Cases Metrics
// ============================================================================

pub mod cases {
    use super::MetricName;

    /// Record rows read from a notification file
    pub fn raw_records(disease: &str, count: usize) {
        ::metrics::counter!(MetricName::CasesRaw.as_str(), "disease" => disease.to_string())
            .increment(count as u64);
    }

    /// Record rows surviving the cleaning pipeline
    pub fn retained_records(disease: &str, count: usize) {
        ::metrics::counter!(MetricName::CasesRetained.as_str(), "disease" => disease.to_string())
            .increment(count as u64);
    }
}

// ============================================================================
// Climate Metrics
// ============================================================================

pub mod climate {
    use super::MetricName;

    pub fn station_parsed() {
        ::metrics::counter!(MetricName::StationFilesParsed.as_str()).increment(1);
    }

    pub fn station_failed() {
        ::metrics::counter!(MetricName::StationFilesFailed.as_str()).increment(1);
    }

    /// Record the time spent parsing one station file
    pub fn parse_duration(secs: f64) {
        ::metrics::histogram!(MetricName::StationParseDuration.as_str()).record(secs);
    }

    pub fn cells_interpolated(count: usize) {
        ::metrics::counter!(MetricName::GridCellsInterpolated.as_str()).increment(count as u64);
    }

    pub fn cells_mean_filled(count: usize) {
        ::metrics::counter!(MetricName::GridCellsMeanFilled.as_str()).increment(count as u64);
    }

    pub fn cells_winsorized(count: usize) {
        ::metrics::counter!(MetricName::GridCellsWinsorized.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Analysis Metrics
// ============================================================================

pub mod analysis {
    use super::MetricName;

    pub fn correlation_computed(variable: &str) {
        ::metrics::counter!(MetricName::CorrelationsComputed.as_str(), "variable" => variable.to_string())
            .increment(1);
    }
}

// ============================================================================
// Cache Metrics
// ============================================================================

pub mod cache {
    use super::MetricName;

    pub fn hit(kind: &str) {
        ::metrics::counter!(MetricName::CacheHits.as_str(), "kind" => kind.to_string()).increment(1);
    }

    pub fn miss(kind: &str) {
        ::metrics::counter!(MetricName::CacheMisses.as_str(), "kind" => kind.to_string()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed_and_unique() {
        let names: Vec<&str> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        assert!(names.iter().all(|n| n.starts_with("arbo_")));
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        cases::raw_records("dengue", 10);
        climate::station_failed();
        cache::miss("climate");
    }
}
