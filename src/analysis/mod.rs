//! Lagged alignment of cases with climate and rank correlation between them.

pub mod engine;
pub mod prepare;
pub mod stats;

pub use engine::{
    build_report, correlate, CorrelationReport, CorrelationResult, CorrelationStat, Direction,
    PrincipalFinding, Strength,
};
pub use prepare::{prepare_correlation, validate_lag, CorrelationDataset, CorrelationRecord};
