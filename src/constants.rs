/// Column names of the notification files, kept consistent across the
/// ingestion and cleaning stages

// Notification file columns
pub const COL_NOTIFICATION_DATE: &str = "DT_NOTIFIC";
pub const COL_UF: &str = "SG_UF";
pub const COL_MUNICIPALITY: &str = "ID_MUNICIP";
pub const COL_SEX: &str = "CS_SEXO";
pub const COL_AGE: &str = "NU_IDADE_N";
pub const COL_CLASSIFICATION: &str = "CLASSI_FIN";

/// Classification code for cases whose diagnosis is not yet final
pub const UNDER_INVESTIGATION_CODE: u8 = 8;

// Chikungunya keeps the primary code plus a down-sample of the
// over-represented secondary code
pub const CHIKUNGUNYA_PRIMARY_CODE: u8 = 5;
pub const CHIKUNGUNYA_SECONDARY_CODE: u8 = 13;

/// Confirmed, probable, under investigation and unknown
pub const ZIKA_ALLOWED_CODES: [u8; 4] = [1, 3, 8, 9];

/// Station files before this year use the legacy INMET layout
pub const LEGACY_FORMAT_CUTOFF_YEAR: i32 = 2019;

/// Metadata lines preceding the header of an INMET station file
pub const STATION_METADATA_LINES: usize = 8;

/// Interpolation is attempted only with at least this many observed months
pub const MIN_MONTHS_FOR_INTERPOLATION: usize = 6;

/// Longest run of missing months filled after a known value
pub const INTERPOLATION_LIMIT: usize = 2;

/// Supported lags, in months
pub const MAX_LAG_MONTHS: u32 = 3;

/// Two-sided significance level
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Winsorization percentiles
pub const WINSOR_LOWER: f64 = 0.05;
pub const WINSOR_UPPER: f64 = 0.95;

/// Columns read from the notification file for a disease
pub fn case_columns(with_classification: bool) -> Vec<&'static str> {
    let mut columns = vec![
        COL_NOTIFICATION_DATE,
        COL_UF,
        COL_MUNICIPALITY,
        COL_SEX,
        COL_AGE,
    ];
    if with_classification {
        columns.push(COL_CLASSIFICATION);
    }
    columns
}
