//! Climate pipeline: station file parsing, consolidation into a regional
//! monthly grid, treatment and diagnostics.

pub mod consolidate;
pub mod diagnostics;
pub mod parser;
pub mod strategies;
pub mod treatment;

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::domain::{ArchiveEntry, StationMonthlyAggregate};
use crate::error::{AnalysisError, Result};
use crate::observability::metrics;
use crate::pipeline::ingestion::decode_latin1;

pub use consolidate::consolidate;
pub use diagnostics::{diagnose, ClimateDiagnostics};
pub use parser::{parse_station_file, FormatEra, StationFileParser};
pub use treatment::treat_grid;

const PROGRESS_EVERY: usize = 50;

/// Aggregates of every station file that parsed, with batch counters
#[derive(Debug, Clone, Default)]
pub struct StationBatch {
    pub aggregates: Vec<StationMonthlyAggregate>,
    pub parsed: usize,
    pub failed: usize,
}

/// Parses every `.csv` entry of a climate archive. A file that cannot be
/// parsed is counted and skipped; only a batch with no success is an error.
#[instrument(skip(entries), fields(entries = entries.len()))]
pub fn process_station_files(entries: &[ArchiveEntry], year: i32) -> Result<StationBatch> {
    let parser = StationFileParser::for_year(year);
    let csv_entries: Vec<&ArchiveEntry> = entries
        .iter()
        .filter(|e| e.name.to_lowercase().ends_with(".csv"))
        .collect();
    info!(
        "Processing {} station files for {} ({:?} layout)",
        csv_entries.len(),
        year,
        parser.era()
    );

    let mut batch = StationBatch::default();
    for (idx, entry) in csv_entries.iter().enumerate() {
        let started = Instant::now();
        let content = decode_latin1(&entry.bytes);
        match parser.parse(&entry.name, &content, year) {
            Some(aggregates) => {
                batch.parsed += 1;
                batch.aggregates.extend(aggregates);
                metrics::climate::station_parsed();
            }
            None => {
                batch.failed += 1;
                debug!("Skipped station file {}", entry.name);
                metrics::climate::station_failed();
            }
        }
        metrics::climate::parse_duration(started.elapsed().as_secs_f64());

        if (idx + 1) % PROGRESS_EVERY == 0 {
            info!("Progress: {}/{} station files", idx + 1, csv_entries.len());
        }
    }

    if batch.parsed == 0 {
        warn!("No station file could be parsed for {}", year);
        return Err(AnalysisError::NoStationData {
            year,
            failed: batch.failed,
        });
    }
    info!(
        "Station batch done: {} parsed, {} failed, {} monthly aggregates",
        batch.parsed,
        batch.failed,
        batch.aggregates.len()
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, content: &str) -> ArchiveEntry {
        ArchiveEntry {
            name: name.to_string(),
            bytes: content.as_bytes().to_vec(),
        }
    }

    const GOOD: &str = "1\n2\n3\n4\n5\n6\n7\n8\nData;Hora UTC;PRECIPITACAO;TEMPERATURA;UMIDADE\n2021/05/01;0000;1,0;20,0;70\n";

    #[test]
    fn test_batch_counts_failures() {
        let entries = vec![
            entry("INMET_SE_SP_A701.CSV", GOOD),
            entry("INMET_N_AM_A101.CSV", "garbage"),
            entry("readme.txt", GOOD),
        ];
        let batch = process_station_files(&entries, 2021).unwrap();
        assert_eq!(batch.parsed, 1);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.aggregates.len(), 1);
    }

    #[test]
    fn test_batch_without_success_is_error() {
        let entries = vec![entry("INMET_N_AM_A101.CSV", "garbage")];
        assert!(matches!(
            process_station_files(&entries, 2021),
            Err(AnalysisError::NoStationData { year: 2021, failed: 1 })
        ));
    }
}
