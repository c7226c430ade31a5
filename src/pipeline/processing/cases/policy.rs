use serde::{Deserialize, Serialize};

use crate::config::SamplingConfig;
use crate::constants::{CHIKUNGUNYA_PRIMARY_CODE, CHIKUNGUNYA_SECONDARY_CODE, ZIKA_ALLOWED_CODES};
use crate::domain::Disease;

/// Fields that may take part in the deduplication key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupField {
    NotificationDate,
    UfCode,
    Municipality,
    Age,
    Sex,
    Classification,
}

/// Inclusive valid age range; ages outside it are nulled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeBounds {
    pub min: f64,
    pub max: f64,
}

impl AgeBounds {
    pub fn contains(&self, age: f64) -> bool {
        age >= self.min && age <= self.max
    }
}

/// How records without a usable notification date are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatePolicy {
    /// Keep records with no date; drop only dates outside the target year
    Permissive,
    /// Require a date inside the target year
    Restrictive,
}

/// Keeps a seeded random fraction of the rows carrying `code`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownsampleRule {
    pub code: u8,
    pub fraction: f64,
    pub seed: u64,
}

/// Classification codes a pipeline keeps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationFilter {
    pub allowed: Vec<u8>,
    /// Rows with this code are sampled and appended after the allowed rows
    pub downsample: Option<DownsampleRule>,
}

/// Per-disease parameters of the generic cleaning pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningPolicy {
    pub name: &'static str,
    pub dedup_key: Vec<DedupField>,
    pub age_bounds: AgeBounds,
    pub date_policy: DatePolicy,
    /// `None` keeps every classification
    pub classification: Option<ClassificationFilter>,
}

impl CleaningPolicy {
    /// Conservative policy used for dengue
    pub fn conservative() -> Self {
        Self {
            name: "conservative",
            dedup_key: vec![
                DedupField::NotificationDate,
                DedupField::UfCode,
                DedupField::Municipality,
                DedupField::Age,
                DedupField::Sex,
            ],
            age_bounds: AgeBounds { min: 0.0, max: 130.0 },
            date_policy: DatePolicy::Permissive,
            classification: None,
        }
    }

    fn strict(name: &'static str, classification: ClassificationFilter) -> Self {
        Self {
            name,
            dedup_key: vec![
                DedupField::NotificationDate,
                DedupField::UfCode,
                DedupField::Municipality,
                DedupField::Age,
                DedupField::Sex,
                DedupField::Classification,
            ],
            age_bounds: AgeBounds { min: 0.0, max: 100.0 },
            date_policy: DatePolicy::Restrictive,
            classification: Some(classification),
        }
    }

    /// Aggressive policy used for chikungunya
    pub fn aggressive(sampling: &SamplingConfig) -> Self {
        Self::strict(
            "aggressive",
            ClassificationFilter {
                allowed: vec![CHIKUNGUNYA_PRIMARY_CODE],
                downsample: Some(DownsampleRule {
                    code: CHIKUNGUNYA_SECONDARY_CODE,
                    fraction: sampling.chikungunya_retention,
                    seed: sampling.seed,
                }),
            },
        )
    }

    /// Moderate policy used for zika
    pub fn moderate() -> Self {
        Self::strict(
            "moderate",
            ClassificationFilter {
                allowed: ZIKA_ALLOWED_CODES.to_vec(),
                downsample: None,
            },
        )
    }

    pub fn for_disease(disease: Disease, sampling: &SamplingConfig) -> Self {
        match disease {
            Disease::Dengue => Self::conservative(),
            Disease::Chikungunya => Self::aggressive(sampling),
            Disease::Zika => Self::moderate(),
        }
    }

    /// Tag of the sampling calibration, e.g. `r0.68_s42`. `None` when the
    /// output does not depend on it.
    pub fn cache_variant(&self) -> Option<String> {
        let rule = self.classification.as_ref()?.downsample.as_ref()?;
        Some(format!("r{}_s{}", rule.fraction, rule.seed))
    }
}
