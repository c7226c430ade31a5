use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{ClimateGrid, ClimateVariable, StationRegion, ValueSource};

/// Statistics of one variable within one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDiagnostics {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub zeros_percent: f64,
    /// Cells not observed directly (interpolated, mean or median filled)
    pub imputed_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDiagnostics {
    pub months: usize,
    pub variables: BTreeMap<ClimateVariable, VariableDiagnostics>,
}

/// Quality diagnosis of a climate grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateDiagnostics {
    pub total_rows: usize,
    pub regions: BTreeMap<StationRegion, RegionDiagnostics>,
    pub problems: Vec<String>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn describe(values: &[f64], imputed: usize) -> VariableDiagnostics {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    // Sample standard deviation
    let std_dev = if values.len() > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };
    let zeros = values.iter().filter(|v| **v == 0.0).count() as f64;
    VariableDiagnostics {
        mean: round2(mean),
        median: round2(median),
        min: round2(sorted[0]),
        max: round2(sorted[sorted.len() - 1]),
        std_dev: round2(std_dev),
        zeros_percent: round2(zeros / n * 100.0),
        imputed_percent: round2(imputed as f64 / n * 100.0),
    }
}

/// Per region/variable statistics plus a list of suspicious patterns:
/// more than 20% imputed cells, more than 50% zeros (not for
/// precipitation) and a range below 1 (not for humidity).
pub fn diagnose(grid: &ClimateGrid) -> ClimateDiagnostics {
    let mut diagnostics = ClimateDiagnostics {
        total_rows: grid.rows.len(),
        ..ClimateDiagnostics::default()
    };

    for region in grid.regions() {
        let rows: Vec<_> = grid.rows.iter().filter(|r| r.region == region).collect();
        let mut variables = BTreeMap::new();
        for variable in ClimateVariable::ALL {
            let values: Vec<f64> = rows.iter().map(|r| *r.values.get(variable)).collect();
            let imputed = rows
                .iter()
                .filter(|r| {
                    matches!(
                        r.provenance.get(variable),
                        ValueSource::Interpolated | ValueSource::GlobalMean | ValueSource::Median
                    )
                })
                .count();
            let stats = describe(&values, imputed);

            if stats.imputed_percent > 20.0 {
                diagnostics.problems.push(format!(
                    "{region} - {variable}: {}% imputed cells",
                    stats.imputed_percent
                ));
            }
            if stats.zeros_percent > 50.0 && variable != ClimateVariable::Precipitation {
                diagnostics.problems.push(format!(
                    "{region} - {variable}: {}% zero values",
                    stats.zeros_percent
                ));
            }
            if stats.max - stats.min < 1.0 && variable != ClimateVariable::Humidity {
                diagnostics.problems.push(format!(
                    "{region} - {variable}: little variation ({} to {})",
                    stats.min, stats.max
                ));
            }
            variables.insert(variable, stats);
        }
        diagnostics.regions.insert(
            region,
            RegionDiagnostics {
                months: rows.len(),
                variables,
            },
        );
    }

    for (region, region_diag) in &diagnostics.regions {
        for (variable, stats) in &region_diag.variables {
            info!(
                "{}: {} mean={} imputed={}%",
                region, variable, stats.mean, stats.imputed_percent
            );
        }
    }
    for problem in &diagnostics.problems {
        warn!("{}", problem);
    }
    diagnostics
}
