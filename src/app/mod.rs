pub mod analysis_use_case;
pub mod ports;

pub use analysis_use_case::{AnalysisOutcome, AnalysisReport, AnalysisRequest, AnalysisService};
