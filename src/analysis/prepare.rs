use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::constants::MAX_LAG_MONTHS;
use crate::domain::{
    ClimateGrid, ClimateValues, Disease, Region, RegionMonthlyCases, StationRegion, YearMonth,
};
use crate::error::{AnalysisError, Result};

/// One region-month case count joined with the climate `lag` months earlier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub disease: Disease,
    pub year: i32,
    pub lag: u32,
    pub region: Region,
    pub case_month: YearMonth,
    pub climate_month: YearMonth,
    pub cases: u64,
    pub climate: ClimateValues<f64>,
    /// e.g. `Feb → Mar`
    pub label: String,
}

/// Joined table fed to the correlation engine. An empty dataset is a
/// valid outcome meaning there was nothing to align.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationDataset {
    pub disease: Disease,
    pub year: i32,
    pub lag: u32,
    pub records: Vec<CorrelationRecord>,
}

impl CorrelationDataset {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Checks that a lag is one of the supported 0 to 3 months
pub fn validate_lag(lag: i64) -> Result<u32> {
    u32::try_from(lag)
        .ok()
        .filter(|l| *l <= MAX_LAG_MONTHS)
        .ok_or(AnalysisError::InvalidLag(lag))
}

/// Inner-joins case counts of `year` with the climate grid on region and
/// `case month - lag`. Case months without a climate match are dropped.
#[instrument(skip(cases, climate), fields(cases = cases.len(), climate = climate.rows.len()))]
pub fn prepare_correlation(
    cases: &[RegionMonthlyCases],
    climate: &ClimateGrid,
    disease: Disease,
    year: i32,
    lag: i64,
) -> Result<CorrelationDataset> {
    let lag = validate_lag(lag)?;

    let records: Vec<CorrelationRecord> = cases
        .iter()
        .filter(|c| c.month.year == year)
        .filter_map(|case| {
            let climate_month = case.month.shift_back(lag);
            let climate_row = climate.find(StationRegion::Known(case.region), climate_month)?;
            Some(CorrelationRecord {
                disease,
                year,
                lag,
                region: case.region,
                case_month: case.month,
                climate_month,
                cases: case.cases,
                climate: climate_row.values,
                label: format!("{} → {}", climate_month.abbreviation(), case.month.abbreviation()),
            })
        })
        .collect();

    if records.is_empty() {
        warn!("No case month matched a climate month for {} {} (lag {})", disease, year, lag);
    } else {
        info!(
            "Prepared {} correlation rows: climate of month M against cases of month M+{}",
            records.len(),
            lag
        );
    }

    Ok(CorrelationDataset {
        disease,
        year,
        lag,
        records,
    })
}
