use thiserror::Error;

use crate::domain::ClimateVariable;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source archive {source_name} unusable: {reason}")]
    Archive { source_name: String, reason: String },

    #[error("No station file could be parsed for {year} ({failed} failed)")]
    NoStationData { year: i32, failed: usize },

    #[error("Climate variable {variable} is absent from every station in {year}")]
    MissingVariable { variable: ClimateVariable, year: i32 },

    #[error("Invalid lag {0}: expected 0 to 3 months")]
    InvalidLag(i64),

    #[error("Unknown disease: {0}")]
    UnknownDisease(String),

    #[error("Unknown climate variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown dataset kind: {0}")]
    UnknownDatasetKind(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
