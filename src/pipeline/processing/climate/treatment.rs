//! Post-consolidation treatment: median fill of remaining gaps, then
//! winsorization to the 5th/95th percentiles. Rows are never removed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::constants::{WINSOR_LOWER, WINSOR_UPPER};
use crate::domain::{
    ClimateGrid, ClimateValues, ClimateVariable, RegionMonthlyClimate, StationRegion, ValueSource,
    YearMonth,
};
use crate::observability::metrics;

/// A grid row whose values may still be missing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialClimateRow {
    pub region: StationRegion,
    pub month: YearMonth,
    pub values: ClimateValues<Option<f64>>,
    pub provenance: ClimateValues<ValueSource>,
}

impl From<RegionMonthlyClimate> for PartialClimateRow {
    fn from(row: RegionMonthlyClimate) -> Self {
        Self {
            region: row.region,
            month: row.month,
            values: row.values.map(|_, v| Some(v)),
            provenance: row.provenance,
        }
    }
}

impl PartialClimateRow {
    /// Dense row, if every variable has a value
    pub fn into_dense(self) -> Option<RegionMonthlyClimate> {
        Some(RegionMonthlyClimate {
            region: self.region,
            month: self.month,
            values: ClimateValues {
                precipitation_mm: self.values.precipitation_mm?,
                temperature_c: self.values.temperature_c?,
                humidity_pct: self.values.humidity_pct?,
            },
            provenance: self.provenance,
        })
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Fills missing values with the median of the same region and calendar
/// month (across years), falling back to the region's overall median.
/// Returns the number of filled cells.
pub fn fill_with_medians(rows: &mut [PartialClimateRow]) -> usize {
    let mut filled = 0;
    for variable in ClimateVariable::ALL {
        let mut by_region_month: HashMap<(StationRegion, u32), Vec<f64>> = HashMap::new();
        let mut by_region: HashMap<StationRegion, Vec<f64>> = HashMap::new();
        for row in rows.iter() {
            if let Some(value) = *row.values.get(variable) {
                by_region_month
                    .entry((row.region, row.month.month))
                    .or_default()
                    .push(value);
                by_region.entry(row.region).or_default().push(value);
            }
        }

        let month_medians: HashMap<(StationRegion, u32), f64> = by_region_month
            .into_iter()
            .filter_map(|(key, values)| median(values).map(|m| (key, m)))
            .collect();
        let region_medians: HashMap<StationRegion, f64> = by_region
            .into_iter()
            .filter_map(|(key, values)| median(values).map(|m| (key, m)))
            .collect();

        for row in rows.iter_mut() {
            if row.values.get(variable).is_some() {
                continue;
            }
            let fill = month_medians
                .get(&(row.region, row.month.month))
                .or_else(|| region_medians.get(&row.region))
                .copied();
            if let Some(value) = fill {
                *row.values.get_mut(variable) = Some(value);
                *row.provenance.get_mut(variable) = ValueSource::Median;
                filled += 1;
            }
        }
    }
    filled
}

/// Lower-nearest and upper-nearest order statistics for the percentiles.
/// Using order statistics keeps repeated clipping idempotent.
pub fn winsor_bounds(values: &[f64], lower: f64, upper: f64) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let last = (sorted.len() - 1) as f64;
    let lo = (lower * last).floor() as usize;
    let hi = (upper * last).ceil() as usize;
    Some((sorted[lo], sorted[hi.min(sorted.len() - 1)]))
}

/// Clips each variable to its 5th/95th percentile bounds over all rows.
/// Returns the number of clipped cells.
pub fn winsorize(rows: &mut [PartialClimateRow]) -> usize {
    let mut clipped = 0;
    for variable in ClimateVariable::ALL {
        let values: Vec<f64> = rows.iter().filter_map(|r| *r.values.get(variable)).collect();
        let Some((lo, hi)) = winsor_bounds(&values, WINSOR_LOWER, WINSOR_UPPER) else {
            continue;
        };
        for row in rows.iter_mut() {
            if let Some(value) = row.values.get_mut(variable) {
                let bounded = value.clamp(lo, hi);
                if bounded != *value {
                    *value = bounded;
                    *row.provenance.get_mut(variable) = ValueSource::Winsorized;
                    clipped += 1;
                }
            }
        }
    }
    clipped
}

/// Median fill followed by winsorization
pub fn treat_rows(rows: &mut [PartialClimateRow]) -> (usize, usize) {
    let filled = fill_with_medians(rows);
    let clipped = winsorize(rows);
    (filled, clipped)
}

/// Treats a consolidated grid in place of its values
#[instrument(skip(grid), fields(year = grid.year, rows = grid.rows.len()))]
pub fn treat_grid(grid: ClimateGrid) -> ClimateGrid {
    let year = grid.year;
    let mut rows: Vec<PartialClimateRow> = grid.rows.into_iter().map(PartialClimateRow::from).collect();
    let (filled, clipped) = treat_rows(&mut rows);
    metrics::climate::cells_winsorized(clipped);
    info!("Treated grid: {} cells median-filled, {} cells clipped", filled, clipped);
    ClimateGrid {
        year,
        rows: rows.into_iter().filter_map(PartialClimateRow::into_dense).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Region;

    fn row(region: Region, year: i32, month: u32, temp: Option<f64>) -> PartialClimateRow {
        PartialClimateRow {
            region: StationRegion::Known(region),
            month: YearMonth::new(year, month).unwrap(),
            values: ClimateValues {
                precipitation_mm: Some(50.0),
                temperature_c: temp,
                humidity_pct: Some(60.0),
            },
            provenance: ClimateValues::from_fn(|_| ValueSource::Observed),
        }
    }

    #[test]
    fn test_median_fill_prefers_same_calendar_month() {
        let mut rows = vec![
            row(Region::Sul, 2021, 3, Some(20.0)),
            row(Region::Sul, 2022, 3, Some(22.0)),
            row(Region::Sul, 2023, 3, None),
            row(Region::Sul, 2023, 4, Some(10.0)),
            row(Region::Sul, 2023, 5, None),
        ];
        let filled = fill_with_medians(&mut rows);
        assert_eq!(filled, 2);
        assert_eq!(rows[2].values.temperature_c, Some(21.0));
        assert_eq!(rows[2].provenance.temperature_c, ValueSource::Median);
        // No May value anywhere: region median of 20, 22, 10
        assert_eq!(rows[4].values.temperature_c, Some(20.0));
    }

    #[test]
    fn test_winsorize_clips_extremes() {
        // 30 cells: the bounds are the 2nd smallest and 2nd largest values
        let mut rows: Vec<PartialClimateRow> = (0..30)
            .map(|i| row(Region::Norte, 2021 + i / 12, (i % 12) as u32 + 1, Some(25.0)))
            .collect();
        rows[0].values.temperature_c = Some(-40.0);
        rows[29].values.temperature_c = Some(49.0);
        let clipped = winsorize(&mut rows);
        assert_eq!(clipped, 2);
        assert_eq!(rows[0].values.temperature_c, Some(25.0));
        assert_eq!(rows[0].provenance.temperature_c, ValueSource::Winsorized);
        assert_eq!(rows[29].values.temperature_c, Some(25.0));
        assert_eq!(winsorize(&mut rows), 0);
    }

    #[test]
    fn test_treatment_is_idempotent() {
        let mut rows: Vec<PartialClimateRow> = (1..=12)
            .map(|m| row(Region::Nordeste, 2023, m, Some(m as f64 * 3.0)))
            .collect();
        treat_rows(&mut rows);
        let once = rows.clone();
        let (filled, clipped) = treat_rows(&mut rows);
        assert_eq!((filled, clipped), (0, 0));
        assert_eq!(rows, once);
    }

    #[test]
    fn test_treat_grid_keeps_rows() {
        let rows: Vec<RegionMonthlyClimate> = (1..=12)
            .filter_map(|m| row(Region::Sudeste, 2023, m, Some(20.0 + m as f64)).into_dense())
            .collect();
        let grid = ClimateGrid { year: 2023, rows };
        let treated = treat_grid(grid.clone());
        assert_eq!(treated.rows.len(), grid.rows.len());
        assert!(treated.rows[0].values.temperature_c >= 21.0);
    }
}
