use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::analysis::prepare::{CorrelationDataset, CorrelationRecord};
use crate::analysis::stats::{round_to, spearman};
use crate::constants::SIGNIFICANCE_LEVEL;
use crate::domain::{ClimateVariable, Disease, Region};
use crate::observability::metrics;

/// Spearman coefficient of one scope
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationStat {
    pub rho: f64,
    pub p_value: f64,
    pub significant: bool,
    pub n: usize,
}

impl CorrelationStat {
    fn compute(records: &[&CorrelationRecord], variable: ClimateVariable) -> Option<Self> {
        let cases: Vec<f64> = records.iter().map(|r| r.cases as f64).collect();
        let climate: Vec<f64> = records.iter().map(|r| *r.climate.get(variable)).collect();
        let (rho, p_value) = spearman(&cases, &climate)?;
        Some(Self {
            rho,
            p_value,
            significant: p_value < SIGNIFICANCE_LEVEL,
            n: records.len(),
        })
    }

    pub fn strength(&self) -> Strength {
        Strength::from_rho(self.rho)
    }

    pub fn direction(&self) -> Direction {
        Direction::from_rho(self.rho)
    }
}

/// Overall and per-region correlation of cases against one variable.
/// A scope with fewer than two points or no variance is omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub disease: Disease,
    pub variable: ClimateVariable,
    pub lag: u32,
    pub overall: Option<CorrelationStat>,
    pub by_region: BTreeMap<Region, CorrelationStat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

impl Strength {
    pub fn from_rho(rho: f64) -> Self {
        let magnitude = rho.abs();
        if magnitude > 0.6 {
            Strength::Strong
        } else if magnitude > 0.3 {
            Strength::Moderate
        } else {
            Strength::Weak
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strength::Strong => "strong",
            Strength::Moderate => "moderate",
            Strength::Weak => "weak",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn from_rho(rho: f64) -> Self {
        if rho > 0.0 {
            Direction::Positive
        } else {
            Direction::Negative
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
        })
    }
}

/// Spearman rank correlation between case counts and `variable`, over
/// the whole dataset and within each region
#[instrument(skip(dataset), fields(disease = %dataset.disease, lag = dataset.lag, rows = dataset.len()))]
pub fn correlate(dataset: &CorrelationDataset, variable: ClimateVariable) -> CorrelationResult {
    let all: Vec<&CorrelationRecord> = dataset.records.iter().collect();
    let overall = CorrelationStat::compute(&all, variable);

    let mut grouped: BTreeMap<Region, Vec<&CorrelationRecord>> = BTreeMap::new();
    for record in &dataset.records {
        grouped.entry(record.region).or_default().push(record);
    }
    let by_region: BTreeMap<Region, CorrelationStat> = grouped
        .into_iter()
        .filter_map(|(region, records)| {
            let stat = CorrelationStat::compute(&records, variable);
            if stat.is_none() {
                debug!("Correlation undefined for {} ({} points)", region, records.len());
            }
            stat.map(|s| (region, s))
        })
        .collect();

    if let Some(stat) = &overall {
        info!(
            "{} vs {} (lag {}): rho={:.3} p={:.4} n={}",
            dataset.disease, variable, dataset.lag, stat.rho, stat.p_value, stat.n
        );
    }
    metrics::analysis::correlation_computed(variable.column_name());

    CorrelationResult {
        disease: dataset.disease,
        variable,
        lag: dataset.lag,
        overall,
        by_region,
    }
}

/// Rounded headline figures of the overall correlation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalFinding {
    pub variable: ClimateVariable,
    pub rho: f64,
    pub p_value: f64,
    pub significant: bool,
    pub strength: Strength,
    pub direction: Direction,
}

/// Presentation summary of a correlation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub disease: Disease,
    pub lag: u32,
    pub periods_analyzed: usize,
    pub principal_finding: Option<PrincipalFinding>,
    pub insights: Vec<String>,
}

fn insight(variable: ClimateVariable, direction: Direction, disease: Disease) -> String {
    let lead = match (variable, direction) {
        (ClimateVariable::Temperature, Direction::Positive) => "Rising temperature",
        (ClimateVariable::Temperature, Direction::Negative) => "Falling temperature",
        (ClimateVariable::Precipitation, Direction::Positive) => "Higher precipitation",
        (ClimateVariable::Precipitation, Direction::Negative) => "Lower precipitation",
        (ClimateVariable::Humidity, Direction::Positive) => "Higher humidity",
        (ClimateVariable::Humidity, Direction::Negative) => "Lower humidity",
    };
    format!("{lead} is associated with more {disease} cases")
}

/// Builds the report. Insight text is only produced for a significant
/// overall association.
pub fn build_report(dataset: &CorrelationDataset, result: &CorrelationResult) -> CorrelationReport {
    let mut report = CorrelationReport {
        disease: result.disease,
        lag: result.lag,
        periods_analyzed: dataset.len(),
        principal_finding: None,
        insights: Vec::new(),
    };

    let Some(stat) = result.overall else {
        report
            .insights
            .push("Insufficient data for correlation analysis".to_string());
        return report;
    };

    let finding = PrincipalFinding {
        variable: result.variable,
        rho: round_to(stat.rho, 3),
        p_value: round_to(stat.p_value, 4),
        significant: stat.significant,
        strength: stat.strength(),
        direction: stat.direction(),
    };

    if finding.significant {
        report
            .insights
            .push(insight(result.variable, finding.direction, result.disease));
        for (region, regional) in &result.by_region {
            if regional.significant {
                report.insights.push(format!(
                    "{}: {} {} correlation (rho = {:.3})",
                    region,
                    regional.strength(),
                    regional.direction(),
                    regional.rho
                ));
            }
        }
    } else {
        report.insights.push(format!(
            "No significant correlation found between {} and {} cases",
            result.variable.label(),
            result.disease
        ));
    }
    report.principal_finding = Some(finding);
    report
}
