use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{CaseRecord, Region, Sex};

/// Non-null count of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCompleteness {
    pub total: usize,
    pub non_null: usize,
    pub percentage: f64,
}

impl FieldCompleteness {
    fn new(total: usize, non_null: usize) -> Self {
        Self {
            total,
            non_null,
            percentage: if total == 0 {
                0.0
            } else {
                non_null as f64 / total as f64 * 100.0
            },
        }
    }
}

/// Summary of a cleaned case table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseQualityReport {
    pub total_records: usize,
    pub under_investigation: usize,
    pub first_notification: Option<NaiveDate>,
    pub last_notification: Option<NaiveDate>,
    pub by_region: BTreeMap<Region, usize>,
    pub by_sex: BTreeMap<Sex, usize>,
    pub completeness: BTreeMap<String, FieldCompleteness>,
}

impl CaseQualityReport {
    /// Empty input yields an empty report
    pub fn from_records(records: &[CaseRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let total = records.len();

        let mut by_region = BTreeMap::new();
        let mut by_sex = BTreeMap::new();
        for record in records {
            if let Some(region) = record.region {
                *by_region.entry(region).or_insert(0) += 1;
            }
            *by_sex.entry(record.sex).or_insert(0) += 1;
        }

        let count = |f: fn(&CaseRecord) -> bool| records.iter().filter(|r| f(r)).count();
        let completeness = [
            ("notification_date", count(|r| r.notification_date.is_some())),
            ("uf_code", count(|r| !r.uf_code.is_empty())),
            ("municipality", count(|r| r.municipality.is_some())),
            ("region", count(|r| r.region.is_some())),
            ("sex", total),
            ("age", count(|r| r.age.is_some())),
            ("classification", count(|r| r.classification.is_some())),
        ]
        .into_iter()
        .map(|(name, non_null)| (name.to_string(), FieldCompleteness::new(total, non_null)))
        .collect();

        let dates = records.iter().filter_map(|r| r.notification_date);
        Self {
            total_records: total,
            under_investigation: count(|r| r.under_investigation),
            first_notification: dates.clone().min(),
            last_notification: dates.max(),
            by_region,
            by_sex,
            completeness,
        }
    }
}
