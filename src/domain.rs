//! Domain data shapes shared across the pipeline stages.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;

/// Month abbreviations used in labels (index 0 = January)
pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Brazil's five official macro-regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "Norte")]
    Norte,
    #[serde(rename = "Nordeste")]
    Nordeste,
    #[serde(rename = "Centro-Oeste")]
    CentroOeste,
    #[serde(rename = "Sudeste")]
    Sudeste,
    #[serde(rename = "Sul")]
    Sul,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::Norte,
        Region::Nordeste,
        Region::CentroOeste,
        Region::Sudeste,
        Region::Sul,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Region::Norte => "Norte",
            Region::Nordeste => "Nordeste",
            Region::CentroOeste => "Centro-Oeste",
            Region::Sudeste => "Sudeste",
            Region::Sul => "Sul",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown region: {s}"))
    }
}

/// Region attached to a weather station. Stations whose file name carries
/// no known region prefix are kept as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum StationRegion {
    Known(Region),
    Other,
}

impl StationRegion {
    pub fn region(&self) -> Option<Region> {
        match self {
            StationRegion::Known(r) => Some(*r),
            StationRegion::Other => None,
        }
    }
}

impl fmt::Display for StationRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationRegion::Known(r) => f.pad(r.name()),
            StationRegion::Other => f.pad("Other"),
        }
    }
}

impl From<StationRegion> for String {
    fn from(value: StationRegion) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for StationRegion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case("other") {
            return Ok(StationRegion::Other);
        }
        value.parse::<Region>().map(StationRegion::Known)
    }
}

/// Calendar month of a specific year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawYearMonth")]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

/// Unchecked form read from cached artifacts
#[derive(Deserialize)]
struct RawYearMonth {
    year: i32,
    month: u32,
}

impl TryFrom<RawYearMonth> for YearMonth {
    type Error = String;

    fn try_from(raw: RawYearMonth) -> Result<Self, Self::Error> {
        YearMonth::new(raw.year, raw.month)
            .ok_or_else(|| format!("month {} of {} is out of range", raw.month, raw.year))
    }
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// All twelve months of `year`, January first
    pub fn months_of(year: i32) -> impl Iterator<Item = YearMonth> {
        (1..=12).map(move |month| YearMonth { year, month })
    }

    /// The month `months` months earlier, crossing year boundaries
    pub fn shift_back(&self, months: u32) -> Self {
        let index = self.year * 12 + (self.month as i32 - 1) - months as i32;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        self.month
            .checked_sub(1)
            .and_then(|idx| MONTH_ABBREVIATIONS.get(idx as usize))
            .copied()
            .unwrap_or("???")
    }

    /// Display label such as `Mar/23`
    pub fn short_label(&self) -> String {
        format!("{}/{:02}", self.abbreviation(), self.year.rem_euclid(100))
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Arboviruses with a documented cleaning policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disease {
    Dengue,
    Chikungunya,
    Zika,
}

impl Disease {
    pub const ALL: [Disease; 3] = [Disease::Dengue, Disease::Chikungunya, Disease::Zika];

    pub fn name(&self) -> &'static str {
        match self {
            Disease::Dengue => "dengue",
            Disease::Chikungunya => "chikungunya",
            Disease::Zika => "zika",
        }
    }

    fn source_prefix(&self) -> &'static str {
        match self {
            Disease::Dengue => "DENGBR",
            Disease::Chikungunya => "CHIKBR",
            Disease::Zika => "ZIKABR",
        }
    }

    /// Name of the yearly notification file, e.g. `DENGBR23.csv`
    pub fn source_file_name(&self, year: i32) -> String {
        format!("{}{:02}.csv", self.source_prefix(), year.rem_euclid(100))
    }

    /// Whether the source file carries the final classification column
    pub fn has_classification(&self) -> bool {
        !matches!(self, Disease::Dengue)
    }
}

impl fmt::Display for Disease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Disease {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Disease::ALL
            .into_iter()
            .find(|d| d.name() == needle)
            .ok_or_else(|| AnalysisError::UnknownDisease(s.to_string()))
    }
}

/// Notified sex, defaulting to indeterminate when missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    Indeterminate,
}

impl Sex {
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(|c| c.trim().to_ascii_uppercase()).as_deref() {
            Some("M") => Sex::Male,
            Some("F") => Sex::Female,
            _ => Sex::Indeterminate,
        }
    }
}

/// One epidemiological notification, progressively refined by the cleaning
/// pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub notification_date: Option<NaiveDate>,
    /// Two-digit state code, or the raw trimmed value when it cannot be normalized
    pub uf_code: String,
    pub municipality: Option<String>,
    /// `None` until mapped, and for codes that map to no region ("undefined")
    pub region: Option<Region>,
    pub sex: Sex,
    pub age: Option<f64>,
    pub classification: Option<u8>,
    pub under_investigation: bool,
}

impl CaseRecord {
    pub fn notification_month(&self) -> Option<YearMonth> {
        self.notification_date.map(YearMonth::from_date)
    }
}

/// Validated case count for one region and month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionMonthlyCases {
    pub region: Region,
    pub month: YearMonth,
    pub cases: u64,
    pub label: String,
}

/// Climate variables tracked per station and region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateVariable {
    Precipitation,
    Temperature,
    Humidity,
}

impl ClimateVariable {
    pub const ALL: [ClimateVariable; 3] = [
        ClimateVariable::Precipitation,
        ClimateVariable::Temperature,
        ClimateVariable::Humidity,
    ];

    pub fn column_name(&self) -> &'static str {
        match self {
            ClimateVariable::Precipitation => "precipitation_mm",
            ClimateVariable::Temperature => "temperature_c",
            ClimateVariable::Humidity => "humidity_pct",
        }
    }

    /// Title-cased label for reports, e.g. `Temperature C`
    pub fn label(&self) -> String {
        self.column_name()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Physically plausible range; readings outside it are discarded
    pub fn plausible_range(&self) -> (f64, f64) {
        match self {
            ClimateVariable::Precipitation => (0.0, 500.0),
            ClimateVariable::Temperature => (-50.0, 50.0),
            ClimateVariable::Humidity => (0.0, 100.0),
        }
    }
}

impl fmt::Display for ClimateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for ClimateVariable {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "precipitation_mm" | "precipitation" | "precipitacao_mm" | "precipitacao" => {
                Ok(ClimateVariable::Precipitation)
            }
            "temperature_c" | "temperature" | "temperatura_c" | "temperatura" => {
                Ok(ClimateVariable::Temperature)
            }
            "humidity_pct" | "humidity" | "umidade_percentual" | "umidade" => {
                Ok(ClimateVariable::Humidity)
            }
            _ => Err(AnalysisError::UnknownVariable(s.to_string())),
        }
    }
}

/// One value per climate variable
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClimateValues<T> {
    pub precipitation_mm: T,
    pub temperature_c: T,
    pub humidity_pct: T,
}

impl<T> ClimateValues<T> {
    pub fn get(&self, variable: ClimateVariable) -> &T {
        match variable {
            ClimateVariable::Precipitation => &self.precipitation_mm,
            ClimateVariable::Temperature => &self.temperature_c,
            ClimateVariable::Humidity => &self.humidity_pct,
        }
    }

    pub fn get_mut(&mut self, variable: ClimateVariable) -> &mut T {
        match variable {
            ClimateVariable::Precipitation => &mut self.precipitation_mm,
            ClimateVariable::Temperature => &mut self.temperature_c,
            ClimateVariable::Humidity => &mut self.humidity_pct,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(ClimateVariable, T) -> U) -> ClimateValues<U> {
        ClimateValues {
            precipitation_mm: f(ClimateVariable::Precipitation, self.precipitation_mm),
            temperature_c: f(ClimateVariable::Temperature, self.temperature_c),
            humidity_pct: f(ClimateVariable::Humidity, self.humidity_pct),
        }
    }

    pub fn from_fn(mut f: impl FnMut(ClimateVariable) -> T) -> Self {
        ClimateValues {
            precipitation_mm: f(ClimateVariable::Precipitation),
            temperature_c: f(ClimateVariable::Temperature),
            humidity_pct: f(ClimateVariable::Humidity),
        }
    }
}

impl ClimateValues<Option<f64>> {
    pub fn is_empty(&self) -> bool {
        ClimateVariable::ALL.iter().all(|v| self.get(*v).is_none())
    }
}

/// One station's summary for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMonthlyAggregate {
    pub station: String,
    pub region: StationRegion,
    pub month: YearMonth,
    /// Precipitation is a sum, temperature and humidity are means
    pub values: ClimateValues<Option<f64>>,
}

/// Where a grid value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Mean of the stations that reported for the region and month
    Observed,
    /// Linear interpolation between neighbouring months of the region
    Interpolated,
    /// Mean of the variable over the whole year grid. This is an
    /// approximation: it ignores both region and season.
    GlobalMean,
    /// Median of the same region (and calendar month when available)
    Median,
    /// Clipped to the 5th/95th percentile bounds
    Winsorized,
}

/// One region's climate for one month after gap filling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMonthlyClimate {
    pub region: StationRegion,
    pub month: YearMonth,
    pub values: ClimateValues<f64>,
    pub provenance: ClimateValues<ValueSource>,
}

/// Dense region × month climate grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateGrid {
    pub year: i32,
    pub rows: Vec<RegionMonthlyClimate>,
}

impl ClimateGrid {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct regions in grid order
    pub fn regions(&self) -> Vec<StationRegion> {
        let mut regions: Vec<StationRegion> = self.rows.iter().map(|r| r.region).collect();
        regions.sort();
        regions.dedup();
        regions
    }

    pub fn find(&self, region: StationRegion, month: YearMonth) -> Option<&RegionMonthlyClimate> {
        self.rows
            .iter()
            .find(|row| row.region == region && row.month == month)
    }

    /// Number of cells filled by a given method
    pub fn count_source(&self, source: ValueSource) -> usize {
        self.rows
            .iter()
            .map(|row| {
                ClimateVariable::ALL
                    .iter()
                    .filter(|v| *row.provenance.get(**v) == source)
                    .count()
            })
            .sum()
    }
}

/// One file from a source archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}
