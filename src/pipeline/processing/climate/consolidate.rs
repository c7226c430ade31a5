use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, instrument, warn};

use crate::constants::{INTERPOLATION_LIMIT, MIN_MONTHS_FOR_INTERPOLATION};
use crate::domain::{
    ClimateGrid, ClimateValues, ClimateVariable, RegionMonthlyClimate, StationMonthlyAggregate,
    StationRegion, ValueSource, YearMonth,
};
use crate::error::{AnalysisError, Result};
use crate::observability::metrics;

/// Fills gaps of `series` in place and returns the filled positions.
///
/// Interior gaps are interpolated linearly between their neighbours and
/// trailing gaps repeat the last known value, but only the first `limit`
/// missing positions after a known value are filled. Leading gaps are left
/// untouched.
pub fn interpolate_forward(series: &mut [Option<f64>], limit: usize) -> Vec<usize> {
    let n = series.len();
    let mut filled = Vec::new();
    let mut i = 0;
    while i < n {
        if series[i].is_some() {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && series[i].is_none() {
            i += 1;
        }
        let end = i;
        if start == 0 {
            continue;
        }
        let Some(prev) = series[start - 1] else {
            continue;
        };
        let anchor = start - 1;
        let stop = end.min(start + limit);
        for pos in start..stop {
            let value = match series.get(end).copied().flatten() {
                Some(next) => {
                    let t = (pos - anchor) as f64 / (end - anchor) as f64;
                    prev + (next - prev) * t
                }
                None => prev,
            };
            series[pos] = Some(value);
            filled.push(pos);
        }
    }
    filled
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Merges every station's monthly aggregates into a dense region × month
/// grid for `year`: 12 rows per observed region and no missing value.
///
/// Gaps are interpolated within a region when it has enough observed
/// months, and anything left is filled with the variable's mean over the
/// whole grid. That last fill ignores region and season, so it is an
/// approximation; the affected cells are tagged [`ValueSource::GlobalMean`].
#[instrument(skip(aggregates), fields(aggregates = aggregates.len()))]
pub fn consolidate(aggregates: &[StationMonthlyAggregate], year: i32) -> Result<ClimateGrid> {
    // Mean of stations per region and month, each variable on its own
    let mut buckets: BTreeMap<(StationRegion, YearMonth), Vec<&ClimateValues<Option<f64>>>> =
        BTreeMap::new();
    for aggregate in aggregates.iter().filter(|a| a.month.year == year) {
        buckets
            .entry((aggregate.region, aggregate.month))
            .or_default()
            .push(&aggregate.values);
    }

    let regions: BTreeSet<StationRegion> = buckets.keys().map(|(region, _)| *region).collect();
    if regions.is_empty() {
        return Err(AnalysisError::NoStationData { year, failed: 0 });
    }
    info!(
        "Building grid: 12 months x {} regions from {} region-months",
        regions.len(),
        buckets.len()
    );

    // Scaffold: every month of the year for every observed region
    let months: Vec<YearMonth> = YearMonth::months_of(year).collect();
    let mut columns: BTreeMap<StationRegion, ClimateValues<Vec<Option<f64>>>> = BTreeMap::new();
    for region in &regions {
        let column = ClimateValues::from_fn(|variable| {
            months
                .iter()
                .map(|month| {
                    buckets.get(&(*region, *month)).and_then(|stations| {
                        mean(stations.iter().filter_map(|values| *values.get(variable)))
                    })
                })
                .collect::<Vec<_>>()
        });
        columns.insert(*region, column);
    }

    let mut provenance: BTreeMap<StationRegion, ClimateValues<Vec<ValueSource>>> = columns
        .iter()
        .map(|(region, column)| {
            (
                *region,
                column.clone().map(|_, series| {
                    series
                        .iter()
                        .map(|_| ValueSource::Observed)
                        .collect::<Vec<_>>()
                }),
            )
        })
        .collect();

    let mut interpolated = 0usize;
    let mut mean_filled = 0usize;
    for variable in ClimateVariable::ALL {
        // Interpolate regions with enough observed months
        for (region, column) in columns.iter_mut() {
            let series = column.get_mut(variable);
            let observed = series.iter().filter(|v| v.is_some()).count();
            if observed < MIN_MONTHS_FOR_INTERPOLATION {
                continue;
            }
            let filled = interpolate_forward(series, INTERPOLATION_LIMIT);
            interpolated += filled.len();
            if let Some(sources) = provenance.get_mut(region) {
                for pos in filled {
                    sources.get_mut(variable)[pos] = ValueSource::Interpolated;
                }
            }
        }

        let missing = columns
            .values()
            .map(|c| c.get(variable).iter().filter(|v| v.is_none()).count())
            .sum::<usize>();
        if missing > columns.len() * 12 * 3 / 10 {
            warn!("{} still has {} missing months after interpolation", variable, missing);
        }

        // Global mean fill for everything still missing
        let global_mean = mean(
            columns
                .values()
                .flat_map(|c| c.get(variable).iter().flatten().copied()),
        )
        .ok_or(AnalysisError::MissingVariable { variable, year })?;

        for (region, column) in columns.iter_mut() {
            for (pos, value) in column.get_mut(variable).iter_mut().enumerate() {
                if value.is_none() {
                    *value = Some(global_mean);
                    mean_filled += 1;
                    if let Some(sources) = provenance.get_mut(region) {
                        sources.get_mut(variable)[pos] = ValueSource::GlobalMean;
                    }
                }
            }
        }
    }

    let mut rows = Vec::with_capacity(columns.len() * 12);
    for (region, column) in &columns {
        let Some(sources) = provenance.get(region) else {
            continue;
        };
        for (pos, month) in months.iter().enumerate() {
            rows.push(RegionMonthlyClimate {
                region: *region,
                month: *month,
                values: ClimateValues::from_fn(|v| column.get(v)[pos].unwrap_or_default()),
                provenance: ClimateValues::from_fn(|v| sources.get(v)[pos]),
            });
        }
    }

    metrics::climate::cells_interpolated(interpolated);
    metrics::climate::cells_mean_filled(mean_filled);
    info!(
        "Grid complete: {} rows, {} cells interpolated, {} cells filled with the global mean",
        rows.len(),
        interpolated,
        mean_filled
    );
    Ok(ClimateGrid { year, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Region;

    fn station(region: Region, month: u32, temp: Option<f64>) -> StationMonthlyAggregate {
        StationMonthlyAggregate {
            station: format!("{region}-{month}"),
            region: StationRegion::Known(region),
            month: YearMonth::new(2023, month).unwrap(),
            values: ClimateValues {
                precipitation_mm: Some(100.0),
                temperature_c: temp,
                humidity_pct: Some(70.0),
            },
        }
    }

    #[test]
    fn test_interpolate_interior_gap() {
        let mut series = vec![Some(1.0), None, None, Some(4.0)];
        let filled = interpolate_forward(&mut series, 2);
        assert_eq!(filled, vec![1, 2]);
        assert_eq!(series, vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_interpolate_respects_limit_and_leading_gaps() {
        let mut series = vec![None, Some(0.0), None, None, None, Some(8.0), None, None, None];
        interpolate_forward(&mut series, 2);
        assert_eq!(
            series,
            vec![None, Some(0.0), Some(2.0), Some(4.0), None, Some(8.0), Some(8.0), Some(8.0), None]
        );
    }

    #[test]
    fn test_stations_are_averaged() {
        let mut stations: Vec<StationMonthlyAggregate> =
            (1..=12).map(|m| station(Region::Sul, m, Some(20.0))).collect();
        stations.push(station(Region::Sul, 1, Some(30.0)));
        stations.push(station(Region::Sul, 1, None));
        let grid = consolidate(&stations, 2023).unwrap();
        let jan = grid
            .find(StationRegion::Known(Region::Sul), YearMonth::new(2023, 1).unwrap())
            .unwrap();
        assert_eq!(jan.values.temperature_c, 25.0);
        assert_eq!(jan.provenance.temperature_c, ValueSource::Observed);
    }

    #[test]
    fn test_grid_is_dense() {
        let mut stations: Vec<StationMonthlyAggregate> =
            (1..=8).map(|m| station(Region::Norte, m, Some(m as f64))).collect();
        stations.push(station(Region::Sudeste, 6, Some(21.0)));
        let grid = consolidate(&stations, 2023).unwrap();
        assert_eq!(grid.rows.len(), 24);
        assert!(grid.rows.iter().all(|r| r.values.temperature_c.is_finite()));

        // Norte: September and October repeat August, later months get the mean
        let norte = StationRegion::Known(Region::Norte);
        let sep = grid.find(norte, YearMonth::new(2023, 9).unwrap()).unwrap();
        assert_eq!(sep.values.temperature_c, 8.0);
        assert_eq!(sep.provenance.temperature_c, ValueSource::Interpolated);
        let dec = grid.find(norte, YearMonth::new(2023, 12).unwrap()).unwrap();
        assert_eq!(dec.provenance.temperature_c, ValueSource::GlobalMean);
    }

    #[test]
    fn test_missing_variable_is_error() {
        let stations: Vec<StationMonthlyAggregate> =
            (1..=3).map(|m| station(Region::Sul, m, None)).collect();
        assert!(matches!(
            consolidate(&stations, 2023),
            Err(AnalysisError::MissingVariable {
                variable: ClimateVariable::Temperature,
                ..
            })
        ));
    }

    #[test]
    fn test_no_stations_is_error() {
        assert!(matches!(
            consolidate(&[], 2023),
            Err(AnalysisError::NoStationData { .. })
        ));
    }
}
