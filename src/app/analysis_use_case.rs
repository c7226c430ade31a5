use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::analysis::{
    build_report, correlate, prepare_correlation, validate_lag, CorrelationDataset,
    CorrelationReport, CorrelationResult,
};
use crate::app::ports::{ArchiveSource, ArtifactCache};
use crate::config::Config;
use crate::domain::{CaseRecord, ClimateGrid, ClimateVariable, Disease, RegionMonthlyCases};
use crate::error::Result;
use crate::gateway::cache::{load_json, save_json, CacheKey, DatasetKind};
use crate::gateway::{DirectoryArchive, FsArtifactCache};
use crate::observability::metrics;
use crate::pipeline::ingestion::read_case_csv;
use crate::pipeline::processing::cases::{clean_cases, group_monthly, CleaningPolicy};
use crate::pipeline::processing::climate::{consolidate, process_station_files, treat_grid};

pub const INSUFFICIENT_DATA_MESSAGE: &str = "Insufficient data for correlation analysis";

/// Parameters of one correlation analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub disease: Disease,
    pub year: i32,
    pub variable: ClimateVariable,
    pub lag: i64,
    pub use_cache: bool,
}

impl AnalysisRequest {
    /// Cache variant, e.g. `temperature_c_lag1`
    pub fn variant(&self) -> String {
        format!("{}_lag{}", self.variable.column_name(), self.lag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Computed {
        dataset: CorrelationDataset,
        result: CorrelationResult,
        report: CorrelationReport,
    },
    InsufficientData {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub request: AnalysisRequest,
    pub generated_at: DateTime<Utc>,
    pub outcome: AnalysisOutcome,
}

/// Entry point for consumers: loads sources, runs the pipelines and
/// caches every intermediate artifact
pub struct AnalysisService {
    cache: Box<dyn ArtifactCache>,
    archive: Box<dyn ArchiveSource>,
    config: Config,
}

impl AnalysisService {
    pub fn new(cache: Box<dyn ArtifactCache>, archive: Box<dyn ArchiveSource>, config: Config) -> Self {
        Self {
            cache,
            archive,
            config,
        }
    }

    /// Filesystem cache and directory archive as configured
    pub fn from_config(config: Config) -> Self {
        let cache = FsArtifactCache::from_config(&config.cache);
        let archive = DirectoryArchive::new(config.sources.root.clone());
        Self::new(Box::new(cache), Box::new(archive), config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn reads_cache(&self, use_cache: bool) -> bool {
        use_cache && self.config.cache.enabled
    }

    fn policy(&self, disease: Disease) -> CleaningPolicy {
        CleaningPolicy::for_disease(disease, &self.config.sampling)
    }

    fn store<T: Serialize>(&self, key: &CacheKey, value: &T) {
        if !self.config.cache.enabled {
            return;
        }
        if let Err(e) = save_json(self.cache.as_ref(), key, value) {
            warn!("Could not cache {}: {}", key, e);
        }
    }

    /// Cleaned notification records, and whether they came from the cache
    #[instrument(skip(self))]
    pub fn cleaned_cases(&self, disease: Disease, year: i32, use_cache: bool) -> Result<(Vec<CaseRecord>, bool)> {
        let policy = self.policy(disease);
        let key = CacheKey::cases(disease, year, policy.cache_variant());
        if self.reads_cache(use_cache) {
            if let Some(records) = load_json::<Vec<CaseRecord>>(self.cache.as_ref(), &key)? {
                info!("Loaded {} cleaned {} records from cache", records.len(), disease);
                return Ok((records, true));
            }
        }

        let mut raw = Vec::new();
        for entry in self.archive.case_archive(disease, year)? {
            let ingest = read_case_csv(&entry.bytes, disease)?;
            if ingest.skipped > 0 {
                warn!("{}: skipped {} unreadable rows", entry.name, ingest.skipped);
            }
            raw.extend(ingest.records);
        }
        metrics::cases::raw_records(disease.name(), raw.len());

        let records = clean_cases(raw, year, &policy);
        metrics::cases::retained_records(disease.name(), records.len());

        self.store(&key, &records);
        Ok((records, false))
    }

    pub fn monthly_cases(&self, disease: Disease, year: i32, use_cache: bool) -> Result<Vec<RegionMonthlyCases>> {
        let (records, _) = self.cleaned_cases(disease, year, use_cache)?;
        Ok(group_monthly(&records, year))
    }

    /// Treated region × month climate grid, and whether it came from the cache
    #[instrument(skip(self))]
    pub fn climate_grid(&self, year: i32, use_cache: bool) -> Result<(ClimateGrid, bool)> {
        let key = CacheKey::climate(year);
        if self.reads_cache(use_cache) {
            if let Some(grid) = load_json::<ClimateGrid>(self.cache.as_ref(), &key)? {
                info!("Loaded climate grid for {} from cache", year);
                return Ok((grid, true));
            }
        }

        let entries = self.archive.climate_archive(year)?;
        let batch = process_station_files(&entries, year)?;
        let grid = treat_grid(consolidate(&batch.aggregates, year)?);

        self.store(&key, &grid);
        Ok((grid, false))
    }

    /// Lagged correlation of one disease against one climate variable
    #[instrument(skip(self, request), fields(disease = %request.disease, year = request.year, variable = %request.variable, lag = request.lag))]
    pub fn analyze(&self, request: AnalysisRequest) -> Result<(AnalysisReport, bool)> {
        let lag = validate_lag(request.lag)?;
        let variant = match self.policy(request.disease).cache_variant() {
            Some(sampling) => format!("{}_{}", request.variant(), sampling),
            None => request.variant(),
        };
        let key = CacheKey::correlation(request.disease, request.year, variant);
        if self.reads_cache(request.use_cache) {
            if let Some(report) = load_json::<AnalysisReport>(self.cache.as_ref(), &key)? {
                info!("Loaded analysis {} from cache", key);
                return Ok((report, true));
            }
        }

        let cases = self.monthly_cases(request.disease, request.year, request.use_cache)?;
        let (grid, _) = self.climate_grid(request.year, request.use_cache)?;
        let dataset = prepare_correlation(&cases, &grid, request.disease, request.year, i64::from(lag))?;

        let outcome = if dataset.is_empty() {
            AnalysisOutcome::InsufficientData {
                message: INSUFFICIENT_DATA_MESSAGE.to_string(),
            }
        } else {
            let result = correlate(&dataset, request.variable);
            let report = build_report(&dataset, &result);
            AnalysisOutcome::Computed {
                dataset,
                result,
                report,
            }
        };

        let report = AnalysisReport {
            request,
            generated_at: Utc::now(),
            outcome,
        };
        self.store(&key, &report);
        Ok((report, false))
    }

    /// Removes cached artifacts of one kind, or all of them
    pub fn clear_cache(&self, kind: Option<DatasetKind>) -> Result<usize> {
        self.cache.invalidate_all(kind)
    }
}
