//! Disease cleaning pipelines: one generic pipeline driven by a per-disease
//! [`CleaningPolicy`].

pub mod monthly;
pub mod policy;
pub mod report;
pub mod steps;

use tracing::{info, instrument};

use crate::domain::CaseRecord;
use crate::pipeline::ingestion::RawCaseRecord;

pub use monthly::group_monthly;
pub use policy::{CleaningPolicy, DatePolicy, DedupField, DownsampleRule};
pub use report::CaseQualityReport;

/// Raw table + target year -> cleaned table. Pure: no I/O, no hidden state.
#[instrument(skip(raw, policy), fields(policy = policy.name, raw = raw.len()))]
pub fn clean_cases(raw: Vec<RawCaseRecord>, year: i32, policy: &CleaningPolicy) -> Vec<CaseRecord> {
    let initial = raw.len();
    if initial == 0 {
        return Vec::new();
    }
    info!("Starting {} pipeline with {} records", policy.name, initial);

    let records = steps::treat_missing(raw);

    let records = steps::deduplicate(records, &policy.dedup_key);
    info!("After deduplication: {}", records.len());

    let records = steps::validate_age(records, policy.age_bounds);

    let mut records = steps::validate_dates(records, year, policy.date_policy);
    info!("After date validation ({:?}): {}", policy.date_policy, records.len());

    if let Some(filter) = &policy.classification {
        records = steps::filter_classifications(records, filter);
        info!("After classification filter: {}", records.len());
    }

    let records = steps::drop_undefined_regions(steps::map_regions(records));
    info!("After region filter: {}", records.len());

    let records = steps::flag_under_investigation(records);
    let under_investigation = records.iter().filter(|r| r.under_investigation).count();

    info!(
        "{} pipeline finished: {} of {} records kept ({:.1}%), {} under investigation",
        policy.name,
        records.len(),
        initial,
        records.len() as f64 / initial as f64 * 100.0,
        under_investigation
    );
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplingConfig;
    use crate::domain::{Disease, Region};

    fn raw(date: &str, uf: &str, municipality: &str, class: &str) -> RawCaseRecord {
        let opt = |v: &str| (!v.is_empty()).then(|| v.to_string());
        RawCaseRecord {
            notification_date: opt(date),
            uf_code: opt(uf),
            municipality: opt(municipality),
            sex: Some("M".to_string()),
            age: Some("30".to_string()),
            classification: opt(class),
        }
    }

    #[test]
    fn test_conservative_keeps_undated_records() {
        let policy = CleaningPolicy::for_disease(Disease::Dengue, &SamplingConfig::default());
        let cleaned = clean_cases(
            vec![
                raw("2023-03-01", "11", "1", ""),
                raw("", "21", "2", ""),
                raw("2022-03-01", "31", "3", ""),
                raw("2023-03-01", "99", "4", ""),
            ],
            2023,
            &policy,
        );
        let regions: Vec<Option<Region>> = cleaned.iter().map(|r| r.region).collect();
        assert_eq!(regions, vec![Some(Region::Norte), Some(Region::Nordeste)]);
        assert!(cleaned.iter().all(|r| !r.under_investigation));
    }

    #[test]
    fn test_moderate_filters_and_flags() {
        let policy = CleaningPolicy::for_disease(Disease::Zika, &SamplingConfig::default());
        let cleaned = clean_cases(
            vec![
                raw("2023-03-01", "41", "1", "1"),
                raw("2023-03-01", "41", "2", "8"),
                raw("2023-03-01", "41", "3", "5"),
                raw("", "41", "4", "1"),
            ],
            2023,
            &policy,
        );
        assert_eq!(cleaned.len(), 2);
        assert!(!cleaned[0].under_investigation);
        assert!(cleaned[1].under_investigation);
    }

    #[test]
    fn test_empty_input_is_empty_output() {
        let policy = CleaningPolicy::moderate();
        assert!(clean_cases(Vec::new(), 2023, &policy).is_empty());
    }
}
