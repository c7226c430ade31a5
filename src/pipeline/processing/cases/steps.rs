//! Primitive cleaning steps shared by every disease pipeline. Each step
//! takes ownership of the table and returns the transformed table.

use std::collections::HashSet;

use chrono::Datelike;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::constants::UNDER_INVESTIGATION_CODE;
use crate::domain::{CaseRecord, Sex};
use crate::pipeline::ingestion::RawCaseRecord;
use crate::pipeline::processing::dates::parse_case_date;
use crate::pipeline::processing::region::{normalize_uf_code, region_for_uf};

use super::policy::{AgeBounds, ClassificationFilter, DatePolicy, DedupField, DownsampleRule};

/// Placeholder state code for records without one
pub const MISSING_UF: &str = "ND";

fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn parse_classification(value: &str) -> Option<u8> {
    let number = parse_number(value)?;
    (number.fract() == 0.0 && (0.0..=255.0).contains(&number)).then_some(number as u8)
}

/// Missing-value treatment: normalizes codes, parses dates and numbers.
/// Unparseable values become null, no record is dropped.
pub fn treat_missing(raw: Vec<RawCaseRecord>) -> Vec<CaseRecord> {
    raw.into_iter()
        .map(|r| {
            let uf_code = match r.uf_code.as_deref() {
                Some(code) => normalize_uf_code(code).unwrap_or_else(|| code.trim().to_string()),
                None => MISSING_UF.to_string(),
            };
            CaseRecord {
                notification_date: r.notification_date.as_deref().and_then(parse_case_date),
                uf_code,
                municipality: r.municipality,
                region: None,
                sex: Sex::from_code(r.sex.as_deref()),
                age: r.age.as_deref().and_then(parse_number),
                classification: r.classification.as_deref().and_then(parse_classification),
                under_investigation: false,
            }
        })
        .collect()
}

fn key_part(record: &CaseRecord, field: DedupField) -> String {
    match field {
        DedupField::NotificationDate => record
            .notification_date
            .map(|d| d.to_string())
            .unwrap_or_default(),
        DedupField::UfCode => record.uf_code.clone(),
        DedupField::Municipality => record.municipality.clone().unwrap_or_default(),
        DedupField::Age => record.age.map(|a| a.to_string()).unwrap_or_default(),
        DedupField::Sex => format!("{:?}", record.sex),
        DedupField::Classification => record
            .classification
            .map(|c| c.to_string())
            .unwrap_or_default(),
    }
}

/// Keeps the first occurrence of each composite key, in input order
pub fn deduplicate(records: Vec<CaseRecord>, key: &[DedupField]) -> Vec<CaseRecord> {
    let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| {
            let composite: Vec<String> = key.iter().map(|f| key_part(record, *f)).collect();
            seen.insert(composite)
        })
        .collect()
}

/// Nulls ages outside the bounds; records are kept
pub fn validate_age(mut records: Vec<CaseRecord>, bounds: AgeBounds) -> Vec<CaseRecord> {
    for record in &mut records {
        if record.age.is_some_and(|age| !bounds.contains(age)) {
            record.age = None;
        }
    }
    records
}

pub fn validate_dates(records: Vec<CaseRecord>, year: i32, policy: DatePolicy) -> Vec<CaseRecord> {
    records
        .into_iter()
        .filter(|record| match (record.notification_date, policy) {
            (Some(date), _) => date.year() == year,
            (None, DatePolicy::Permissive) => true,
            (None, DatePolicy::Restrictive) => false,
        })
        .collect()
}

/// Keeps `round(fraction * n)` rows chosen with a seeded generator,
/// preserving their input order
pub fn downsample(records: Vec<CaseRecord>, rule: &DownsampleRule) -> Vec<CaseRecord> {
    let total = records.len();
    let keep = ((rule.fraction.clamp(0.0, 1.0) * total as f64).round() as usize).min(total);
    let mut rng = StdRng::seed_from_u64(rule.seed);
    let mut chosen = rand::seq::index::sample(&mut rng, total, keep).into_vec();
    chosen.sort_unstable();

    let mut chosen = chosen.into_iter().peekable();
    records
        .into_iter()
        .enumerate()
        .filter_map(|(idx, record)| {
            if chosen.peek() == Some(&idx) {
                chosen.next();
                Some(record)
            } else {
                None
            }
        })
        .collect()
}

/// Keeps allowed codes; a down-sampled secondary code is appended after them
pub fn filter_classifications(records: Vec<CaseRecord>, filter: &ClassificationFilter) -> Vec<CaseRecord> {
    let (allowed, rest): (Vec<CaseRecord>, Vec<CaseRecord>) = records
        .into_iter()
        .partition(|r| r.classification.is_some_and(|c| filter.allowed.contains(&c)));

    match &filter.downsample {
        Some(rule) => {
            let secondary: Vec<CaseRecord> = rest
                .into_iter()
                .filter(|r| r.classification == Some(rule.code))
                .collect();
            let mut combined = allowed;
            combined.extend(downsample(secondary, rule));
            combined
        }
        None => allowed,
    }
}

pub fn map_regions(mut records: Vec<CaseRecord>) -> Vec<CaseRecord> {
    for record in &mut records {
        record.region = region_for_uf(&record.uf_code);
    }
    records
}

/// Drops records whose state code maps to no region
pub fn drop_undefined_regions(records: Vec<CaseRecord>) -> Vec<CaseRecord> {
    records.into_iter().filter(|r| r.region.is_some()).collect()
}

pub fn flag_under_investigation(mut records: Vec<CaseRecord>) -> Vec<CaseRecord> {
    for record in &mut records {
        record.under_investigation = record.classification == Some(UNDER_INVESTIGATION_CODE);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Region;
    use chrono::NaiveDate;

    fn raw(date: &str, uf: &str, age: &str, class: &str) -> RawCaseRecord {
        let opt = |v: &str| (!v.is_empty()).then(|| v.to_string());
        RawCaseRecord {
            notification_date: opt(date),
            uf_code: opt(uf),
            municipality: Some("355030".to_string()),
            sex: Some("F".to_string()),
            age: opt(age),
            classification: opt(class),
        }
    }

    fn record_with_class(class: u8, municipality: usize) -> CaseRecord {
        CaseRecord {
            notification_date: NaiveDate::from_ymd_opt(2023, 1, 1),
            uf_code: "35".to_string(),
            municipality: Some(municipality.to_string()),
            region: None,
            sex: Sex::Female,
            age: Some(30.0),
            classification: Some(class),
            under_investigation: false,
        }
    }

    #[test]
    fn test_treat_missing_normalizes_fields() {
        let records = treat_missing(vec![
            raw("2023-02-01", "35.0", "abc", "5.0"),
            raw("", "", "42", ""),
        ]);
        assert_eq!(records[0].uf_code, "35");
        assert_eq!(records[0].age, None);
        assert_eq!(records[0].classification, Some(5));
        assert_eq!(records[1].uf_code, MISSING_UF);
        assert_eq!(records[1].notification_date, None);
        assert_eq!(records[1].age, Some(42.0));
        assert_eq!(Sex::from_code(None), Sex::Indeterminate);
    }

    #[test]
    fn test_deduplicate_keeps_first_seen() {
        let mut a = record_with_class(5, 1);
        a.age = Some(10.0);
        let mut b = a.clone();
        b.classification = Some(13);
        let records = vec![a.clone(), b.clone(), a.clone()];

        let five_key = [
            DedupField::NotificationDate,
            DedupField::UfCode,
            DedupField::Municipality,
            DedupField::Age,
            DedupField::Sex,
        ];
        let deduped = deduplicate(records.clone(), &five_key);
        assert_eq!(deduped, vec![a.clone()]);

        let mut six_key = five_key.to_vec();
        six_key.push(DedupField::Classification);
        assert_eq!(deduplicate(records, &six_key), vec![a, b]);
    }

    #[test]
    fn test_validate_age_nulls_out_of_range() {
        let mut young = record_with_class(5, 1);
        young.age = Some(-1.0);
        let mut old = record_with_class(5, 2);
        old.age = Some(120.0);
        let out = validate_age(vec![young, old], AgeBounds { min: 0.0, max: 130.0 });
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].age, None);
        assert_eq!(out[1].age, Some(120.0));
    }

    #[test]
    fn test_date_policies() {
        let in_year = record_with_class(5, 1);
        let mut other_year = record_with_class(5, 2);
        other_year.notification_date = NaiveDate::from_ymd_opt(2022, 12, 31);
        let mut undated = record_with_class(5, 3);
        undated.notification_date = None;
        let records = vec![in_year, other_year, undated];

        let permissive = validate_dates(records.clone(), 2023, DatePolicy::Permissive);
        assert_eq!(permissive.len(), 2);
        let restrictive = validate_dates(records, 2023, DatePolicy::Restrictive);
        assert_eq!(restrictive.len(), 1);
    }

    #[test]
    fn test_downsample_is_deterministic_and_ordered() {
        let records: Vec<CaseRecord> = (0..50).map(|i| record_with_class(13, i)).collect();
        let rule = DownsampleRule {
            code: 13,
            fraction: 0.68,
            seed: 42,
        };
        let first = downsample(records.clone(), &rule);
        let second = downsample(records, &rule);
        assert_eq!(first.len(), 34);
        assert_eq!(first, second);

        let positions: Vec<usize> = first
            .iter()
            .map(|r| r.municipality.as_ref().unwrap().parse().unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn test_filter_classifications_unions_sample_after_primary() {
        let records = vec![
            record_with_class(13, 0),
            record_with_class(5, 1),
            record_with_class(1, 2),
            record_with_class(13, 3),
        ];
        let filter = ClassificationFilter {
            allowed: vec![5],
            downsample: Some(DownsampleRule {
                code: 13,
                fraction: 1.0,
                seed: 42,
            }),
        };
        let out = filter_classifications(records, &filter);
        let classes: Vec<u8> = out.iter().filter_map(|r| r.classification).collect();
        assert_eq!(classes, vec![5, 13, 13]);
    }

    #[test]
    fn test_region_mapping_and_investigation_flag() {
        let mut unknown = record_with_class(8, 1);
        unknown.uf_code = "99".to_string();
        let records = map_regions(vec![record_with_class(8, 0), unknown]);
        assert_eq!(records[0].region, Some(Region::Sudeste));
        assert_eq!(records[1].region, None);

        let records = flag_under_investigation(drop_undefined_regions(records));
        assert_eq!(records.len(), 1);
        assert!(records[0].under_investigation);
    }
}
